use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::Serialize;
use std::fmt;
use crate::{
    data::SurvivalData,
    error::{Result, SurvivalError},
    metrics::ModelMetrics,
    optimization::{invert_matrix, CoxOptimizer, OptimizationConfig},
    stats,
};

/// cox proportional hazards model, fit by newton-raphson
#[derive(Debug, Clone)]
pub struct CoxModel {
    state: Option<CoxFit>,     // populated by fit()
    l2_penalty: f64,           // ridge penalty, 0 = plain partial likelihood
    max_iterations: usize,     // newton iteration limit
    tolerance: f64,            // convergence threshold on the log-likelihood
    confidence_level: f64,     // for coefficient intervals
}

#[derive(Debug, Clone)]
struct CoxFit {
    coefficients: Array1<f64>,
    covariance: Array2<f64>,
    feature_names: Vec<String>,
    null_log_likelihood: f64,
    metrics: ModelMetrics,
    iterations: usize,
    n_samples: usize,
    n_events: usize,
}

impl Default for CoxModel {
    fn default() -> Self {
        Self {
            state: None,
            l2_penalty: 0.0,
            max_iterations: 100,
            tolerance: 1e-9,
            confidence_level: 0.95,
        }
    }
}

impl CoxModel {
    /// new cox model w/ defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// add ridge penalty (L2) - shrinks coefficients
    pub fn with_l2_penalty(mut self, penalty: f64) -> Self {
        self.l2_penalty = penalty.max(0.0);
        self
    }

    /// max iterations before giving up
    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    /// how close is close enough for convergence
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub fn with_confidence_level(mut self, level: f64) -> Self {
        self.confidence_level = level;
        self
    }

    /// fit the model to data.
    ///
    /// covariates are standardized for the optimizer and the estimates mapped
    /// back, so coefficients are per unit of the original covariate. failure
    /// to converge is an error, never a partially fitted model.
    pub fn fit(&mut self, data: &SurvivalData) -> Result<&mut Self> {
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(SurvivalError::invalid_parameter("confidence_level", self.confidence_level));
        }

        self.state = None;

        let mut working = data.clone();
        let (_means, stds) = working.standardize_covariates()?;

        let optimizer = CoxOptimizer::new(OptimizationConfig {
            l2_penalty: self.l2_penalty,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
        });
        let result = optimizer.optimize(&working)?;
        let standardized_covariance = invert_matrix(&result.information)?;

        let coefficients = &result.coefficients / &stds;
        let n_features = coefficients.len();
        let mut covariance = Array2::zeros((n_features, n_features));
        for j in 0..n_features {
            for k in 0..n_features {
                covariance[[j, k]] = standardized_covariance[[j, k]] / (stds[j] * stds[k]);
            }
        }

        if (0..n_features).any(|j| !(covariance[[j, j]] > 0.0) || !covariance[[j, j]].is_finite()) {
            return Err(SurvivalError::numerical_error(
                "coefficient variances are not positive - the fit is degenerate",
            ));
        }

        let risk_scores = data.covariates().dot(&coefficients);
        let metrics = ModelMetrics::compute(data, risk_scores.view(), n_features)?;

        log::info!(
            "cox fit converged in {} iterations: log-likelihood {:.3} (null {:.3}), concordance {:.3}",
            result.iterations,
            result.log_likelihood,
            result.null_log_likelihood,
            metrics.concordance
        );

        self.state = Some(CoxFit {
            coefficients,
            covariance,
            feature_names: data.feature_names().to_vec(),
            null_log_likelihood: result.null_log_likelihood,
            metrics,
            iterations: result.iterations,
            n_samples: data.n_samples(),
            n_events: data.n_events(),
        });

        Ok(self)
    }

    fn fitted(&self) -> Result<&CoxFit> {
        self.state.as_ref().ok_or(SurvivalError::ModelNotFitted)
    }

    /// get the fitted coefficients (betas)
    pub fn coefficients(&self) -> Result<ArrayView1<'_, f64>> {
        Ok(self.fitted()?.coefficients.view())
    }

    /// sqrt of the diagonal of the inverse information
    pub fn standard_errors(&self) -> Result<Array1<f64>> {
        Ok(self.fitted()?.covariance.diag().mapv(f64::sqrt))
    }

    pub fn covariance(&self) -> Result<ArrayView2<'_, f64>> {
        Ok(self.fitted()?.covariance.view())
    }

    /// linear predictor x'beta for each row
    pub fn predict(&self, covariates: ArrayView2<f64>) -> Result<Array1<f64>> {
        let coefs = self.coefficients()?;

        if covariates.ncols() != coefs.len() {
            return Err(SurvivalError::invalid_dimensions(
                format!("feature count mismatch: expected {}, got {}",
                       coefs.len(), covariates.ncols())
            ));
        }

        Ok(covariates.dot(&coefs))
    }

    /// relative hazard exp(x'beta) for each row
    pub fn predict_hazard_ratios(&self, covariates: ArrayView2<f64>) -> Result<Array1<f64>> {
        let linear_predictors = self.predict(covariates)?;
        Ok(linear_predictors.mapv(f64::exp))
    }

    /// has this model been fit to data yet?
    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    /// per-covariate table plus model-level tests
    pub fn summary(&self) -> Result<CoxSummary> {
        let fit = self.fitted()?;
        let z_crit = stats::z_for_confidence(self.confidence_level);

        let rows = fit
            .feature_names
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let coef = fit.coefficients[j];
                let se = fit.covariance[[j, j]].sqrt();
                let z = coef / se;
                let coef_lower = coef - z_crit * se;
                let coef_upper = coef + z_crit * se;
                CoefficientRow {
                    name: name.clone(),
                    coef,
                    hazard_ratio: coef.exp(),
                    se,
                    z,
                    p_value: stats::two_sided_p(z),
                    coef_lower,
                    coef_upper,
                    hr_lower: coef_lower.exp(),
                    hr_upper: coef_upper.exp(),
                }
            })
            .collect();

        let log_likelihood = fit.metrics.log_likelihood;
        let lr_statistic = (2.0 * (log_likelihood - fit.null_log_likelihood)).max(0.0);
        let lr_df = fit.coefficients.len();

        Ok(CoxSummary {
            rows,
            confidence_level: self.confidence_level,
            l2_penalty: self.l2_penalty,
            log_likelihood,
            null_log_likelihood: fit.null_log_likelihood,
            lr_statistic,
            lr_df,
            lr_p_value: stats::chi_square_sf(lr_statistic, lr_df),
            aic_partial: fit.metrics.aic,
            concordance: fit.metrics.concordance,
            iterations: fit.iterations,
            n_samples: fit.n_samples,
            n_events: fit.n_events,
        })
    }
}

/// one covariate's estimate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoefficientRow {
    pub name: String,
    pub coef: f64,
    /// exp(coef)
    pub hazard_ratio: f64,
    pub se: f64,
    pub z: f64,
    pub p_value: f64,
    pub coef_lower: f64,
    pub coef_upper: f64,
    pub hr_lower: f64,
    pub hr_upper: f64,
}

impl CoefficientRow {
    /// percent change in hazard per unit, negative = lower churn risk
    pub fn risk_change_pct(&self) -> f64 {
        (self.hazard_ratio - 1.0) * 100.0
    }
}

/// what the model learned
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoxSummary {
    pub rows: Vec<CoefficientRow>,
    pub confidence_level: f64,
    pub l2_penalty: f64,
    pub log_likelihood: f64,
    pub null_log_likelihood: f64,
    /// likelihood-ratio test against the empty model
    pub lr_statistic: f64,
    pub lr_df: usize,
    pub lr_p_value: f64,
    pub aic_partial: f64,
    pub concordance: f64,
    pub iterations: usize,
    pub n_samples: usize,
    pub n_events: usize,
}

impl CoxSummary {
    pub fn row(&self, name: &str) -> Option<&CoefficientRow> {
        self.rows.iter().find(|r| r.name == name)
    }
}

impl fmt::Display for CoxSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = self.confidence_level * 100.0;
        writeln!(f, "observations = {}, events = {}", self.n_samples, self.n_events)?;
        writeln!(
            f,
            "{:<26} {:>9} {:>9} {:>8} {:>8} {:>10} {:>21}",
            "covariate", "coef", "exp(coef)", "se", "z", "p", format!("{:.0}% CI exp(coef)", pct)
        )?;
        writeln!(f, "{:-<97}", "")?;

        for row in &self.rows {
            writeln!(
                f,
                "{:<26} {:>9.4} {:>9.4} {:>8.4} {:>8.2} {:>10} {:>10.4} {:>10.4}",
                row.name,
                row.coef,
                row.hazard_ratio,
                row.se,
                row.z,
                format_p(row.p_value),
                row.hr_lower,
                row.hr_upper
            )?;
        }

        writeln!(f, "{:-<97}", "")?;
        writeln!(f, "concordance = {:.3}", self.concordance)?;
        writeln!(f, "partial AIC = {:.2}", self.aic_partial)?;
        writeln!(
            f,
            "log-likelihood = {:.3} (null {:.3})",
            self.log_likelihood, self.null_log_likelihood
        )?;
        write!(
            f,
            "likelihood ratio test = {:.2} on {} df, {}",
            self.lr_statistic,
            self.lr_df,
            p_clause(self.lr_p_value)
        )
    }
}

/// p-values below 0.001 are shown as a bound
pub fn format_p(p: f64) -> String {
    if p < 0.001 {
        "<0.001".to_string()
    } else {
        format!("{:.4}", p)
    }
}

/// "p = 0.0432" or "p < 0.001", for running text
pub fn p_clause(p: f64) -> String {
    if p < 0.001 {
        "p < 0.001".to_string()
    } else {
        format!("p = {:.4}", p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use approx::assert_relative_eq;

    fn create_test_data() -> SurvivalData {
        let times = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let events = vec![true, true, false, true, true, false, true, true];
        let covariates = Array2::from_shape_vec((8, 2), vec![
            1.0, 0.0,
            0.0, 1.0,
            1.0, 1.0,
            -1.0, 0.0,
            0.0, -1.0,
            1.0, -1.0,
            -1.0, 1.0,
            0.0, 0.0,
        ]).unwrap();

        SurvivalData::new(times, events, covariates).unwrap()
    }

    #[test]
    fn test_model_creation() {
        let model = CoxModel::new()
            .with_l2_penalty(0.05)
            .with_max_iterations(500)
            .with_tolerance(1e-7);

        assert_eq!(model.l2_penalty, 0.05);
        assert_eq!(model.max_iterations, 500);
        assert_eq!(model.tolerance, 1e-7);
        assert!(!model.is_fitted());
    }

    #[test]
    fn test_model_not_fitted_error() {
        let model = CoxModel::new();
        assert!(model.coefficients().is_err());
        assert!(model.summary().is_err());

        let covariates = Array2::zeros((5, 3));
        assert!(model.predict(covariates.view()).is_err());
    }

    #[test]
    fn test_known_optimum() {
        // reference solution of this data set (newton iterated to machine precision)
        let data = create_test_data();
        let mut model = CoxModel::new();
        model.fit(&data).unwrap();

        let coefs = model.coefficients().unwrap();
        assert_relative_eq!(coefs[0], -0.038371443744, epsilon = 1e-5);
        assert_relative_eq!(coefs[1], 0.223746404756, epsilon = 1e-5);

        let summary = model.summary().unwrap();
        assert_relative_eq!(summary.log_likelihood, -7.629919670152664, epsilon = 1e-7);
    }

    #[test]
    fn test_summary_hazard_ratios_are_exp_coef() {
        let data = create_test_data();
        let mut model = CoxModel::new();
        model.fit(&data).unwrap();
        let summary = model.summary().unwrap();

        assert_eq!(summary.rows.len(), 2);
        for row in &summary.rows {
            assert_eq!(row.hazard_ratio, row.coef.exp());
            assert_eq!(row.hr_lower, row.coef_lower.exp());
            assert!(row.coef_lower < row.coef && row.coef < row.coef_upper);
            assert!(row.se > 0.0);
            assert!((0.0..=1.0).contains(&row.p_value));
        }
        assert!(summary.lr_statistic >= 0.0);
        assert!(summary.row("x1").is_some());
        assert!(summary.row("nope").is_none());
    }

    #[test]
    fn test_scale_invariance() {
        // rescaling a covariate rescales its coefficient and nothing else
        let data = create_test_data();
        let mut scaled_cov = data.covariates().to_owned();
        scaled_cov.column_mut(0).mapv_inplace(|x| x * 10.0 + 3.0);
        let scaled = SurvivalData::new(data.times().to_vec(), data.events().to_vec(), scaled_cov).unwrap();

        let mut a = CoxModel::new();
        a.fit(&data).unwrap();
        let mut b = CoxModel::new();
        b.fit(&scaled).unwrap();

        let ca = a.coefficients().unwrap();
        let cb = b.coefficients().unwrap();
        assert_relative_eq!(cb[0] * 10.0, ca[0], epsilon = 1e-6);
        assert_relative_eq!(cb[1], ca[1], epsilon = 1e-6);
        assert_relative_eq!(
            b.standard_errors().unwrap()[0] * 10.0,
            a.standard_errors().unwrap()[0],
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_prediction_dimension_mismatch() {
        let data = create_test_data();
        let mut model = CoxModel::new();
        model.fit(&data).unwrap();

        let wrong_covariates = Array2::zeros((5, 3));
        assert!(model.predict(wrong_covariates.view()).is_err());

        let hr = model.predict_hazard_ratios(data.covariates()).unwrap();
        let lp = model.predict(data.covariates()).unwrap();
        for (h, l) in hr.iter().zip(lp.iter()) {
            assert_relative_eq!(*h, l.exp(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_degenerate_covariate_is_fatal() {
        let times = vec![1.0, 2.0, 3.0, 4.0];
        let events = vec![true, false, true, true];
        let covariates = Array2::from_shape_vec((4, 2), vec![
            1.0, 5.0,
            0.0, 5.0,
            1.0, 5.0,
            0.0, 5.0,
        ]).unwrap();
        let data = SurvivalData::new(times, events, covariates).unwrap();

        let mut model = CoxModel::new();
        assert!(model.fit(&data).is_err());
        assert!(!model.is_fitted());
    }

    #[test]
    fn test_format_p() {
        assert_eq!(format_p(0.0004), "<0.001");
        assert_eq!(format_p(0.04321), "0.0432");
        assert_eq!(p_clause(0.0004), "p < 0.001");
        assert_eq!(p_clause(0.04321), "p = 0.0432");
    }

    #[test]
    fn test_display_lists_every_covariate() {
        let data = create_test_data();
        let mut model = CoxModel::new();
        model.fit(&data).unwrap();
        let text = model.summary().unwrap().to_string();
        assert!(text.contains("x0"));
        assert!(text.contains("x1"));
        assert!(text.contains("concordance"));
        assert!(text.contains("likelihood ratio test"));
        assert!(!text.contains("= <"));
    }
}
