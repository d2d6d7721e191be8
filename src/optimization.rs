use ndarray::{Array1, Array2};
use crate::{
    data::SurvivalData,
    error::{Result, SurvivalError},
};

/// coefficients (on the scale the optimizer sees) past this are treated as a
/// diverging fit - the likelihood has no finite maximum
const MAX_COEFFICIENT: f64 = 50.0;

/// relative pivot size below which a matrix counts as singular
const SINGULAR_PIVOT: f64 = 1e-10;

/// Configuration for the Newton-Raphson fit
#[derive(Debug, Clone)]
pub struct OptimizationConfig {
    pub l2_penalty: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            l2_penalty: 0.0,
            max_iterations: 100,
            tolerance: 1e-9,
        }
    }
}

/// what a converged fit hands back
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub coefficients: Array1<f64>,
    /// observed information (negative hessian of the log partial likelihood)
    pub information: Array2<f64>,
    pub log_likelihood: f64,
    pub null_log_likelihood: f64,
    pub iterations: usize,
}

/// log partial likelihood, gradient and hessian under breslow ties
#[derive(Debug, Clone)]
pub struct LikelihoodDerivatives {
    pub log_likelihood: f64,
    pub gradient: Array1<f64>,
    pub hessian: Array2<f64>,
}

/// Newton-Raphson maximizer of the cox partial likelihood
pub struct CoxOptimizer {
    config: OptimizationConfig,
}

impl CoxOptimizer {
    pub fn new(config: OptimizationConfig) -> Self {
        Self { config }
    }

    /// fit from beta = 0. anything short of convergence is an error - a
    /// half-fitted model never comes back as a result.
    pub fn optimize(&self, data: &SurvivalData) -> Result<OptimizationResult> {
        if data.n_events() == 0 {
            return Err(SurvivalError::invalid_survival_data(
                "no events - the partial likelihood is flat",
            ));
        }

        let mut beta = Array1::zeros(data.n_features());
        let mut current = self.penalized_derivatives(data, &beta)?;
        let null_log_likelihood = current.log_likelihood;

        for iteration in 1..=self.config.max_iterations {
            let step = solve_linear_system(&current.hessian, &current.gradient)?;

            // newton decrement: how much the quadratic model still expects to gain
            let decrement = current.gradient.dot(&step).abs();
            if decrement < self.config.tolerance {
                // close enough that the full newton step is safe to take
                return self.finish(data, &beta - &step, null_log_likelihood, iteration);
            }

            // step halving until the likelihood stops going down
            let floor = current.log_likelihood - 1e-10 * current.log_likelihood.abs().max(1.0);
            let mut scale = 1.0;
            let (candidate, next) = loop {
                let candidate = &beta - &(scale * &step);
                match self.penalized_derivatives(data, &candidate) {
                    Ok(next) if next.log_likelihood.is_finite() && next.log_likelihood >= floor => {
                        break (candidate, next);
                    }
                    _ => {
                        scale *= 0.5;
                        if scale < 1e-10 {
                            return Err(SurvivalError::convergence_failed(
                                iteration,
                                "step halving could not improve the partial likelihood",
                            ));
                        }
                    }
                }
            };

            let delta = next.log_likelihood - current.log_likelihood;
            log::debug!(
                "newton iteration {}: log-likelihood {:.6} (delta {:.3e}, step scale {})",
                iteration,
                next.log_likelihood,
                delta,
                scale
            );

            beta = candidate;
            current = next;

            if beta.iter().any(|b| !b.is_finite() || b.abs() > MAX_COEFFICIENT) {
                return Err(SurvivalError::numerical_error(
                    "coefficients diverged - a covariate perfectly separates churners",
                ));
            }

            if delta.abs() < self.config.tolerance {
                return self.finish(data, beta, null_log_likelihood, iteration);
            }
        }

        Err(SurvivalError::convergence_failed(
            self.config.max_iterations,
            "Newton-Raphson hit the iteration limit",
        ))
    }

    fn finish(
        &self,
        data: &SurvivalData,
        beta: Array1<f64>,
        null_log_likelihood: f64,
        iterations: usize,
    ) -> Result<OptimizationResult> {
        let unpenalized = likelihood_derivatives(data, &beta)?;
        let mut information = -unpenalized.hessian;
        for i in 0..beta.len() {
            information[[i, i]] += self.config.l2_penalty;
        }

        Ok(OptimizationResult {
            coefficients: beta,
            information,
            log_likelihood: unpenalized.log_likelihood,
            null_log_likelihood,
            iterations,
        })
    }

    fn penalized_derivatives(&self, data: &SurvivalData, beta: &Array1<f64>) -> Result<LikelihoodDerivatives> {
        let mut derivs = likelihood_derivatives(data, beta)?;
        let lambda = self.config.l2_penalty;

        if lambda > 0.0 {
            derivs.log_likelihood -= 0.5 * lambda * beta.dot(beta);
            derivs.gradient.scaled_add(-lambda, beta);
            for i in 0..beta.len() {
                derivs.hessian[[i, i]] -= lambda;
            }
        }

        Ok(derivs)
    }
}

/// log partial likelihood and its first two derivatives.
///
/// walks the users from the latest time to the earliest so each risk set is
/// the running sum of everything seen so far; tied times enter together
/// before their events are scored (breslow).
pub fn likelihood_derivatives(data: &SurvivalData, beta: &Array1<f64>) -> Result<LikelihoodDerivatives> {
    let n_features = data.n_features();
    if beta.len() != n_features {
        return Err(SurvivalError::invalid_dimensions(format!(
            "expected {} coefficients, got {}",
            n_features,
            beta.len()
        )));
    }

    let covariates = data.covariates();
    let times = data.times();
    let events = data.events();
    let order = data.descending_order();
    let linear_pred = covariates.dot(beta);

    let mut log_likelihood = 0.0;
    let mut gradient = Array1::zeros(n_features);
    let mut hessian = Array2::zeros((n_features, n_features));

    // risk set sums: S0 = sum w, S1 = sum w x, S2 = sum w x x'
    let mut risk_sum = 0.0;
    let mut weighted_covariate_sum: Array1<f64> = Array1::zeros(n_features);
    let mut weighted_outer_sum: Array2<f64> = Array2::zeros((n_features, n_features));

    let mut start = 0;
    while start < order.len() {
        let time = times[order[start]];
        let mut end = start;
        while end < order.len() && times[order[end]] == time {
            end += 1;
        }
        let tie_group = &order[start..end];

        for &i in tie_group {
            let weight = linear_pred[i].exp();
            if !weight.is_finite() {
                return Err(SurvivalError::numerical_error(format!(
                    "risk score overflowed: exp({})",
                    linear_pred[i]
                )));
            }

            let row = covariates.row(i);
            risk_sum += weight;
            weighted_covariate_sum.scaled_add(weight, &row);
            for j in 0..n_features {
                for k in 0..n_features {
                    weighted_outer_sum[[j, k]] += weight * row[j] * row[k];
                }
            }
        }

        let mut n_events = 0usize;
        for &i in tie_group {
            if events[i] {
                n_events += 1;
                log_likelihood += linear_pred[i];
                gradient += &covariates.row(i);
            }
        }

        if n_events > 0 {
            if risk_sum <= 0.0 {
                return Err(SurvivalError::numerical_error("risk set sum is non-positive"));
            }

            let d = n_events as f64;
            let weighted_mean = &weighted_covariate_sum / risk_sum;
            log_likelihood -= d * risk_sum.ln();
            gradient.scaled_add(-d, &weighted_mean);

            for j in 0..n_features {
                for k in 0..n_features {
                    let variance = weighted_outer_sum[[j, k]] / risk_sum - weighted_mean[j] * weighted_mean[k];
                    hessian[[j, k]] -= d * variance;
                }
            }
        }

        start = end;
    }

    Ok(LikelihoodDerivatives {
        log_likelihood,
        gradient,
        hessian,
    })
}

/// Solve linear system Ax = b by gaussian elimination with partial pivoting
pub fn solve_linear_system(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return Err(SurvivalError::invalid_dimensions("matrix dimensions mismatch"));
    }

    let scale = a.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    if scale == 0.0 || !scale.is_finite() {
        return Err(SurvivalError::SingularMatrix);
    }

    let mut a_copy = a.clone();
    let mut b_copy = b.clone();

    // forward elimination
    for i in 0..n {
        let mut max_row = i;
        for k in i + 1..n {
            if a_copy[[k, i]].abs() > a_copy[[max_row, i]].abs() {
                max_row = k;
            }
        }

        if a_copy[[max_row, i]].abs() < SINGULAR_PIVOT * scale {
            return Err(SurvivalError::SingularMatrix);
        }

        if max_row != i {
            for j in 0..n {
                a_copy.swap([i, j], [max_row, j]);
            }
            b_copy.swap(i, max_row);
        }

        for k in i + 1..n {
            let factor = a_copy[[k, i]] / a_copy[[i, i]];
            for j in i..n {
                a_copy[[k, j]] -= factor * a_copy[[i, j]];
            }
            b_copy[k] -= factor * b_copy[i];
        }
    }

    // back substitution
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        x[i] = b_copy[i];
        for j in i + 1..n {
            x[i] -= a_copy[[i, j]] * x[j];
        }
        x[i] /= a_copy[[i, i]];
    }

    Ok(x)
}

/// inverse via one solve per identity column
pub fn invert_matrix(a: &Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    let mut inverse = Array2::zeros((n, n));
    for j in 0..n {
        let mut unit = Array1::zeros(n);
        unit[j] = 1.0;
        let column = solve_linear_system(a, &unit)?;
        inverse.column_mut(j).assign(&column);
    }
    Ok(inverse)
}
