use ndarray::ArrayView1;
use serde::Serialize;
use crate::{
    data::SurvivalData,
    error::{Result, SurvivalError},
};

/// Harrell's C-index with tie handling - how often does the higher risk
/// score belong to the user who churned first?
pub fn harrell_c_index(
    risk_scores: ArrayView1<f64>,
    times: ArrayView1<f64>,
    events: ArrayView1<bool>,
) -> Result<f64> {
    let n = risk_scores.len();
    if n != times.len() || n != events.len() {
        return Err(SurvivalError::invalid_dimensions(
            "risk scores, times, and events must have same length"
        ));
    }

    let mut concordant = 0.0;
    let mut discordant = 0.0;
    let mut tied_risk = 0.0;

    for i in 0..n {
        if !events[i] {
            continue; // censored users can't anchor a pair
        }

        for j in 0..n {
            if i == j {
                continue;
            }

            // j outlived i (event later, or censored at/after i's event)
            if times[j] > times[i] || (!events[j] && times[j] >= times[i]) {
                if risk_scores[i] > risk_scores[j] {
                    concordant += 1.0;
                } else if risk_scores[i] < risk_scores[j] {
                    discordant += 1.0;
                } else {
                    tied_risk += 1.0;
                }
            }
        }
    }

    let total_pairs = concordant + discordant + tied_risk;
    if total_pairs == 0.0 {
        return Err(SurvivalError::numerical_error(
            "no comparable pairs for C-index calculation"
        ));
    }

    Ok((concordant + 0.5 * tied_risk) / total_pairs)
}

/// Log partial likelihood for given risk scores (breslow ties)
pub fn log_partial_likelihood(
    data: &SurvivalData,
    risk_scores: ArrayView1<f64>,
) -> Result<f64> {
    if risk_scores.len() != data.n_samples() {
        return Err(SurvivalError::invalid_dimensions(
            "risk scores length must match number of samples"
        ));
    }

    let times = data.times();
    let events = data.events();
    let mut loglik = 0.0;

    for &event_time in &data.event_times() {
        let events_at_time: Vec<usize> = (0..data.n_samples())
            .filter(|&i| times[i] == event_time && events[i])
            .collect();

        let risk_set: Vec<usize> = (0..data.n_samples())
            .filter(|&i| times[i] >= event_time)
            .collect();

        // log-sum-exp, shifted by the max for stability
        let max_risk = risk_set.iter().map(|&i| risk_scores[i]).fold(f64::NEG_INFINITY, f64::max);
        let log_sum_exp = max_risk +
            risk_set.iter()
                .map(|&i| (risk_scores[i] - max_risk).exp())
                .sum::<f64>()
                .ln();

        for &event_idx in &events_at_time {
            loglik += risk_scores[event_idx] - log_sum_exp;
        }
    }

    Ok(loglik)
}

/// partial AIC
pub fn aic(log_likelihood: f64, n_parameters: usize) -> f64 {
    2.0 * n_parameters as f64 - 2.0 * log_likelihood
}

/// goodness-of-fit numbers for a fitted cox model
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelMetrics {
    pub concordance: f64,
    pub log_likelihood: f64,
    pub aic: f64,
}

impl ModelMetrics {
    pub fn compute(
        data: &SurvivalData,
        risk_scores: ArrayView1<f64>,
        n_parameters: usize,
    ) -> Result<Self> {
        let concordance = harrell_c_index(risk_scores, data.times(), data.events())?;
        let log_likelihood = log_partial_likelihood(data, risk_scores)?;

        Ok(Self {
            concordance,
            log_likelihood,
            aic: aic(log_likelihood, n_parameters),
        })
    }
}
