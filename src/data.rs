use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use crate::error::{Result, SurvivalError};
use crate::simulate::{SubscriptionTier, UserRecord, UserType};

/// covariate columns produced by `SurvivalData::from_records`, first level of
/// each categorical dropped (free tier, interviewer)
pub const COX_FEATURES: [&str; 5] = [
    "num_interviews",
    "avg_score",
    "subscription_tier_premium",
    "user_type_job_seeker",
    "user_type_recruiter",
];

/// survival data - times, events, and per-user covariates
#[derive(Debug, Clone)]
pub struct SurvivalData {
    times: Array1<f64>,              // time to event/censoring
    events: Array1<bool>,            // true = event, false = censored
    covariates: Array2<f64>,         // n_samples x n_features
    feature_names: Vec<String>,
    descending_order: Vec<usize>,    // sample indices, latest time first
}

impl SurvivalData {
    /// make new survival data from raw vecs/arrays
    pub fn new(
        times: Vec<f64>,
        events: Vec<bool>,
        covariates: Array2<f64>,
    ) -> Result<Self> {
        let names = (0..covariates.ncols()).map(|j| format!("x{}", j)).collect();
        Self::with_feature_names(times, events, covariates, names)
    }

    pub fn with_feature_names(
        times: Vec<f64>,
        events: Vec<bool>,
        covariates: Array2<f64>,
        feature_names: Vec<String>,
    ) -> Result<Self> {
        let n_samples = times.len();

        if events.len() != n_samples {
            return Err(SurvivalError::invalid_dimensions(
                format!("times len ({}) != events len ({})", n_samples, events.len())
            ));
        }

        if covariates.nrows() != n_samples {
            return Err(SurvivalError::invalid_dimensions(
                format!("covariates rows ({}) != n_samples ({})", covariates.nrows(), n_samples)
            ));
        }

        if feature_names.len() != covariates.ncols() {
            return Err(SurvivalError::invalid_dimensions(
                format!("{} feature names for {} columns", feature_names.len(), covariates.ncols())
            ));
        }

        if times.iter().any(|&t| t <= 0.0 || !t.is_finite()) {
            return Err(SurvivalError::invalid_survival_data(
                "survival times must be positive & finite"
            ));
        }

        if covariates.iter().any(|x| !x.is_finite()) {
            return Err(SurvivalError::invalid_survival_data(
                "covariates must be finite"
            ));
        }

        // finite times were checked above so the comparison is total
        let mut descending_order: Vec<usize> = (0..n_samples).collect();
        descending_order.sort_by(|&a, &b| times[b].total_cmp(&times[a]));

        Ok(Self {
            times: Array1::from(times),
            events: Array1::from(events),
            covariates,
            feature_names,
            descending_order,
        })
    }

    /// cox design matrix for the simulated cohort, columns per `COX_FEATURES`
    pub fn from_records(users: &[UserRecord]) -> Result<Self> {
        let n = users.len();
        let mut covariates = Array2::zeros((n, COX_FEATURES.len()));

        for (i, user) in users.iter().enumerate() {
            covariates[[i, 0]] = f64::from(user.num_interviews);
            covariates[[i, 1]] = user.avg_score;
            covariates[[i, 2]] = indicator(user.subscription_tier == SubscriptionTier::Premium);
            covariates[[i, 3]] = indicator(user.user_type == UserType::JobSeeker);
            covariates[[i, 4]] = indicator(user.user_type == UserType::Recruiter);
        }

        Self::with_feature_names(
            users.iter().map(|u| u.time_observed).collect(),
            users.iter().map(|u| u.churned).collect(),
            covariates,
            COX_FEATURES.iter().map(|s| s.to_string()).collect(),
        )
    }

    /// how many users
    pub fn n_samples(&self) -> usize {
        self.times.len()
    }

    /// how many covariates per user
    pub fn n_features(&self) -> usize {
        self.covariates.ncols()
    }

    pub fn n_events(&self) -> usize {
        self.events.iter().filter(|&&e| e).count()
    }

    /// survival/censoring times
    pub fn times(&self) -> ArrayView1<'_, f64> {
        self.times.view()
    }

    /// event indicators (true = event, false = censored)
    pub fn events(&self) -> ArrayView1<'_, bool> {
        self.events.view()
    }

    pub fn covariates(&self) -> ArrayView2<'_, f64> {
        self.covariates.view()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// sample indices sorted by time, latest first. risk sets are prefixes.
    pub fn descending_order(&self) -> &[usize] {
        &self.descending_order
    }

    /// unique event times in order
    pub fn event_times(&self) -> Vec<f64> {
        let mut times: Vec<f64> = self.times
            .iter()
            .zip(self.events.iter())
            .filter_map(|(time, event)| if *event { Some(*time) } else { None })
            .collect();

        times.sort_by(f64::total_cmp);
        times.dedup();
        times
    }

    /// grab a subset of users by indices
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        if indices.iter().any(|&i| i >= self.n_samples()) {
            return Err(SurvivalError::invalid_dimensions(
                "subset index out of bounds"
            ));
        }

        let times: Vec<f64> = indices.iter().map(|&i| self.times[i]).collect();
        let events: Vec<bool> = indices.iter().map(|&i| self.events[i]).collect();
        let covariates = self.covariates.select(Axis(0), indices);

        Self::with_feature_names(times, events, covariates, self.feature_names.clone())
    }

    /// standardize features (mean=0, std=1) in place, returns (means, stds).
    /// a constant column can't be estimated so it's an error.
    pub fn standardize_covariates(&mut self) -> Result<(Array1<f64>, Array1<f64>)> {
        let means = self.covariates
            .mean_axis(Axis(0))
            .ok_or_else(|| SurvivalError::invalid_survival_data("no samples to standardize"))?;
        let stds = self.covariates.std_axis(Axis(0), 0.0);

        for j in 0..self.n_features() {
            if stds[j] == 0.0 {
                return Err(SurvivalError::numerical_error(
                    format!("covariate '{}' has zero variance - can't estimate its effect", self.feature_names[j])
                ));
            }
        }

        for mut row in self.covariates.rows_mut() {
            row -= &means;
            row /= &stds;
        }

        Ok((means, stds))
    }
}

fn indicator(flag: bool) -> f64 {
    if flag { 1.0 } else { 0.0 }
}
