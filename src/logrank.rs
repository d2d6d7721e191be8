//! two-sample log-rank test.
//!
//! at every distinct event time in the pooled sample the deaths in group a
//! are compared to their expectation under a common hazard; the squared,
//! variance-scaled sum of those differences is chi-square with 1 df.

use serde::Serialize;

use crate::{
    error::{Result, SurvivalError},
    stats,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRankTest {
    pub statistic: f64,
    pub p_value: f64,
    pub degrees_of_freedom: usize,
    pub observed_a: usize,
    pub expected_a: f64,
    pub observed_b: usize,
    pub expected_b: f64,
}

impl LogRankTest {
    /// compare two groups of (duration, event) pairs
    pub fn compare(
        times_a: &[f64],
        events_a: &[bool],
        times_b: &[f64],
        events_b: &[bool],
    ) -> Result<Self> {
        if times_a.len() != events_a.len() || times_b.len() != events_b.len() {
            return Err(SurvivalError::invalid_dimensions(
                "each group needs one event flag per duration",
            ));
        }
        if times_a.is_empty() || times_b.is_empty() {
            return Err(SurvivalError::invalid_survival_data(
                "log-rank test needs observations in both groups",
            ));
        }
        if times_a.iter().chain(times_b).any(|t| !t.is_finite()) {
            return Err(SurvivalError::invalid_survival_data("durations must be finite"));
        }

        // (time, in group a, event)
        let mut pooled: Vec<(f64, bool, bool)> = times_a
            .iter()
            .zip(events_a)
            .map(|(&t, &e)| (t, true, e))
            .chain(times_b.iter().zip(events_b).map(|(&t, &e)| (t, false, e)))
            .collect();
        pooled.sort_by(|x, y| x.0.total_cmp(&y.0));

        let mut at_risk_a = times_a.len() as f64;
        let mut at_risk_b = times_b.len() as f64;
        let mut observed_a = 0usize;
        let mut observed_b = 0usize;
        let mut expected_a = 0.0;
        let mut variance = 0.0;

        let mut i = 0;
        while i < pooled.len() {
            let time = pooled[i].0;
            let (mut deaths_a, mut deaths_b, mut leaving_a, mut leaving_b) = (0usize, 0usize, 0usize, 0usize);

            while i < pooled.len() && pooled[i].0 == time {
                let (_, in_a, event) = pooled[i];
                match (in_a, event) {
                    (true, true) => deaths_a += 1,
                    (false, true) => deaths_b += 1,
                    _ => {}
                }
                if in_a {
                    leaving_a += 1;
                } else {
                    leaving_b += 1;
                }
                i += 1;
            }

            let deaths = (deaths_a + deaths_b) as f64;
            if deaths > 0.0 {
                let n = at_risk_a + at_risk_b;
                expected_a += deaths * at_risk_a / n;
                if n > 1.0 {
                    variance += at_risk_a * at_risk_b * deaths * (n - deaths) / (n * n * (n - 1.0));
                }
                observed_a += deaths_a;
                observed_b += deaths_b;
            }

            at_risk_a -= leaving_a as f64;
            at_risk_b -= leaving_b as f64;
        }

        if variance <= 0.0 {
            return Err(SurvivalError::numerical_error(
                "log-rank variance is zero - no events to compare",
            ));
        }

        let total_events = (observed_a + observed_b) as f64;
        let diff = observed_a as f64 - expected_a;
        let statistic = diff * diff / variance;

        Ok(Self {
            statistic,
            p_value: stats::chi_square_sf(statistic, 1),
            degrees_of_freedom: 1,
            observed_a,
            expected_a,
            observed_b,
            expected_b: total_events - expected_a,
        })
    }

    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}
