//! kaplan-meier product-limit estimator with greenwood confidence bands.
//!
//! the band uses the log(-log S) transform so it always stays inside [0, 1].

use serde::Serialize;

use crate::{
    error::{Result, SurvivalError},
    stats,
};

/// the estimate right after one distinct event time
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SurvivalStep {
    pub time: f64,
    pub n_at_risk: usize,
    pub n_events: usize,
    pub n_censored: usize,
    pub survival: f64,
    pub lower: f64,
    pub upper: f64,
}

/// survival read off the curve at a fixed time. `None` = not estimable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Checkpoint {
    pub time: f64,
    pub n_at_risk: usize,
    pub survival: Option<f64>,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

/// point on the drawn step curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    pub time: f64,
    pub survival: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct KaplanMeier {
    label: String,
    n_samples: usize,
    n_events: usize,
    max_time: f64,
    confidence_level: f64,
    steps: Vec<SurvivalStep>,
    #[serde(skip)]
    sorted_times: Vec<f64>,
}

impl KaplanMeier {
    /// fit the product-limit estimate to (duration, event) pairs
    pub fn fit(
        label: impl Into<String>,
        times: &[f64],
        events: &[bool],
        confidence_level: f64,
    ) -> Result<Self> {
        let label = label.into();

        if times.len() != events.len() {
            return Err(SurvivalError::invalid_dimensions(format!(
                "times len ({}) != events len ({})",
                times.len(),
                events.len()
            )));
        }
        if times.is_empty() {
            return Err(SurvivalError::invalid_survival_data(format!(
                "group '{}' has no observations",
                label
            )));
        }
        if times.iter().any(|&t| t < 0.0 || !t.is_finite()) {
            return Err(SurvivalError::invalid_survival_data(
                "durations must be non-negative & finite",
            ));
        }
        if !(confidence_level > 0.0 && confidence_level < 1.0) {
            return Err(SurvivalError::invalid_parameter("confidence_level", confidence_level));
        }

        let z = stats::z_for_confidence(confidence_level);

        let mut order: Vec<usize> = (0..times.len()).collect();
        order.sort_by(|&a, &b| times[a].total_cmp(&times[b]));

        let mut steps = Vec::new();
        let mut survival = 1.0;
        let mut greenwood_sum = 0.0;
        let mut n_at_risk = times.len();
        let mut i = 0;

        while i < order.len() {
            let time = times[order[i]];
            let mut n_events = 0;
            let mut n_censored = 0;

            while i < order.len() && times[order[i]] == time {
                if events[order[i]] {
                    n_events += 1;
                } else {
                    n_censored += 1;
                }
                i += 1;
            }

            if n_events > 0 {
                let n = n_at_risk as f64;
                let d = n_events as f64;
                survival *= 1.0 - d / n;

                greenwood_sum += if n_at_risk > n_events {
                    d / (n * (n - d))
                } else {
                    f64::INFINITY
                };

                let (lower, upper) = log_log_band(survival, greenwood_sum, z);
                steps.push(SurvivalStep {
                    time,
                    n_at_risk,
                    n_events,
                    n_censored,
                    survival,
                    lower,
                    upper,
                });
            }

            n_at_risk -= n_events + n_censored;
        }

        let n_events: usize = steps.iter().map(|s| s.n_events).sum();
        if n_events == 0 {
            log::warn!(
                "group '{}' has no events - survival stays at 1 and the median is not reached",
                label
            );
        }

        Ok(Self {
            label,
            n_samples: times.len(),
            n_events,
            max_time: times.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            confidence_level,
            steps,
            sorted_times: order.iter().map(|&i| times[i]).collect(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn n_events(&self) -> usize {
        self.n_events
    }

    pub fn has_events(&self) -> bool {
        self.n_events > 0
    }

    /// last observed time (event or censoring)
    pub fn max_time(&self) -> f64 {
        self.max_time
    }

    pub fn confidence_level(&self) -> f64 {
        self.confidence_level
    }

    pub fn steps(&self) -> &[SurvivalStep] {
        &self.steps
    }

    /// number still at risk at time t (observed time >= t)
    pub fn n_at_risk(&self, t: f64) -> usize {
        let left = self.sorted_times.partition_point(|&x| x < t);
        self.n_samples - left
    }

    fn step_at(&self, t: f64) -> Option<&SurvivalStep> {
        let idx = self.steps.partition_point(|s| s.time <= t);
        idx.checked_sub(1).map(|i| &self.steps[i])
    }

    /// S(t) as a right-continuous step function.
    ///
    /// `None` once t runs past the last observation while survival is still
    /// positive - nobody is left at risk so the curve isn't identified there.
    pub fn survival_at(&self, t: f64) -> Option<f64> {
        if t < 0.0 {
            return Some(1.0);
        }
        let survival = self.step_at(t).map_or(1.0, |s| s.survival);
        if t > self.max_time && survival > 0.0 {
            return None;
        }
        Some(survival)
    }

    /// confidence band at t, same domain as `survival_at`
    pub fn confidence_at(&self, t: f64) -> Option<(f64, f64)> {
        self.survival_at(t)?;
        Some(self.step_at(t).map_or((1.0, 1.0), |s| (s.lower, s.upper)))
    }

    /// first time survival drops to 0.5 or below; `None` = never reached
    pub fn median(&self) -> Option<f64> {
        self.quantile_time(0.5)
    }

    /// first time survival drops to `q` or below
    pub fn quantile_time(&self, q: f64) -> Option<f64> {
        self.steps.iter().find(|s| s.survival <= q).map(|s| s.time)
    }

    pub fn checkpoints(&self, times: &[f64]) -> Vec<Checkpoint> {
        times
            .iter()
            .map(|&time| {
                let band = self.confidence_at(time);
                Checkpoint {
                    time,
                    n_at_risk: self.n_at_risk(time),
                    survival: self.survival_at(time),
                    lower: band.map(|b| b.0),
                    upper: band.map(|b| b.1),
                }
            })
            .collect()
    }

    /// corner points of the step curve from t = 0 to the last observation
    pub fn curve(&self) -> Vec<CurvePoint> {
        let mut points = Vec::with_capacity(2 * self.steps.len() + 2);
        let mut prev = CurvePoint {
            time: 0.0,
            survival: 1.0,
            lower: 1.0,
            upper: 1.0,
        };
        points.push(prev);

        for step in &self.steps {
            // horizontal run to the drop, then the drop itself
            points.push(CurvePoint { time: step.time, ..prev });
            prev = CurvePoint {
                time: step.time,
                survival: step.survival,
                lower: step.lower,
                upper: step.upper,
            };
            points.push(prev);
        }

        if self.max_time > prev.time {
            points.push(CurvePoint { time: self.max_time, ..prev });
        }
        points
    }
}

fn log_log_band(survival: f64, greenwood_sum: f64, z: f64) -> (f64, f64) {
    if survival <= 0.0 {
        return (0.0, 0.0);
    }
    if survival >= 1.0 {
        return (1.0, 1.0);
    }
    let log_s = survival.ln();
    let se = (greenwood_sum / (log_s * log_s)).sqrt();
    if !se.is_finite() {
        return (0.0, 1.0);
    }
    let lower = survival.powf((z * se).exp());
    let upper = survival.powf((-z * se).exp());
    (lower.clamp(0.0, 1.0), upper.clamp(0.0, 1.0))
}
