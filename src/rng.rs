//! deterministic random draws for the cohort simulation.
//!
//! nothing in the crate touches a platform rng - every draw comes from a
//! `SeededRng` built from the study seed, so a seed fully determines a run.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

pub struct SeededRng {
    inner: Pcg64Mcg,
}

impl SeededRng {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    /// float in [0, 1)
    pub fn uniform(&mut self) -> f64 {
        self.inner.gen::<f64>()
    }

    /// integer in [0, n)
    pub fn below(&mut self, n: u32) -> u32 {
        debug_assert!(n > 0, "n must be > 0");
        self.inner.gen_range(0..n)
    }

    /// bernoulli trial with success probability p
    pub fn chance(&mut self, p: f64) -> bool {
        self.uniform() < p
    }

    /// index drawn proportionally to `weights` (need not sum to 1)
    pub fn choose_weighted(&mut self, weights: &[f64]) -> usize {
        let total: f64 = weights.iter().sum();
        let mut target = self.uniform() * total;

        for (i, &w) in weights.iter().enumerate() {
            if target < w {
                return i;
            }
            target -= w;
        }
        // float slop lands on the last non-zero bucket
        weights.iter().rposition(|&w| w > 0.0).unwrap_or(0)
    }

    /// exponential with the given rate (mean = 1/rate), inverse cdf
    pub fn exponential(&mut self, rate: f64) -> f64 {
        // 1 - u is in (0, 1] so the log never sees zero
        -(1.0 - self.uniform()).ln() / rate
    }

    /// normal via box-muller
    pub fn normal(&mut self, mean: f64, sd: f64) -> f64 {
        let u1 = 1.0 - self.uniform();
        let u2 = self.uniform();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + sd * z
    }

    /// poisson via knuth's multiplication method - fine for small means
    pub fn poisson(&mut self, mean: f64) -> u32 {
        if mean <= 0.0 {
            return 0;
        }
        let limit = (-mean).exp();
        let mut k = 0u32;
        let mut p = self.uniform();
        while p > limit {
            k += 1;
            p *= self.uniform();
        }
        k
    }
}
