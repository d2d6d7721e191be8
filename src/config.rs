//! study parameters - every constant of the retention study lives here so
//! runs are reproducible and tests can shrink the cohort.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SurvivalError};

/// relative weights for job_seeker / interviewer / recruiter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserTypeWeights {
    pub job_seeker: f64,
    pub interviewer: f64,
    pub recruiter: f64,
}

impl UserTypeWeights {
    pub fn as_array(&self) -> [f64; 3] {
        [self.job_seeker, self.interviewer, self.recruiter]
    }
}

impl Default for UserTypeWeights {
    fn default() -> Self {
        Self {
            job_seeker: 0.60,
            interviewer: 0.25,
            recruiter: 0.15,
        }
    }
}

/// everything the simulation and the estimators need to know
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyConfig {
    pub seed: u64,
    pub n_users: usize,
    pub study_start: NaiveDate,
    pub signup_window_days: u32,
    /// observation window length in days; event times beyond it are censored
    pub study_horizon: f64,
    pub base_hazard: f64,
    pub premium_risk_factor: f64,
    pub high_activity_risk_factor: f64,
    pub high_activity_threshold: u32,
    pub premium_share: f64,
    pub user_type_weights: UserTypeWeights,
    pub mean_interviews: f64,
    pub score_mean: f64,
    pub score_sd: f64,
    pub checkpoints: Vec<f64>,
    pub significance_level: f64,
    pub confidence_level: f64,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            n_users: 1500,
            study_start: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap_or_default(),
            signup_window_days: 31,
            study_horizon: 120.0,
            base_hazard: 0.015,
            premium_risk_factor: 0.43,
            high_activity_risk_factor: 0.32,
            high_activity_threshold: 5,
            premium_share: 0.30,
            user_type_weights: UserTypeWeights::default(),
            mean_interviews: 5.0,
            score_mean: 75.0,
            score_sd: 12.0,
            checkpoints: vec![30.0, 60.0, 90.0, 120.0],
            significance_level: 0.05,
            confidence_level: 0.95,
        }
    }
}

impl StudyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_n_users(mut self, n_users: usize) -> Self {
        self.n_users = n_users;
        self
    }

    pub fn with_study_horizon(mut self, horizon: f64) -> Self {
        self.study_horizon = horizon;
        self
    }

    pub fn with_base_hazard(mut self, hazard: f64) -> Self {
        self.base_hazard = hazard;
        self
    }

    /// multiplicative hazard reductions for premium users and active users
    pub fn with_risk_factors(mut self, premium: f64, high_activity: f64) -> Self {
        self.premium_risk_factor = premium;
        self.high_activity_risk_factor = high_activity;
        self
    }

    pub fn with_high_activity_threshold(mut self, threshold: u32) -> Self {
        self.high_activity_threshold = threshold;
        self
    }

    pub fn with_premium_share(mut self, share: f64) -> Self {
        self.premium_share = share;
        self
    }

    pub fn with_checkpoints(mut self, checkpoints: Vec<f64>) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    pub fn with_confidence_level(mut self, level: f64) -> Self {
        self.confidence_level = level;
        self
    }

    /// reject configs the generator or estimators can't work with
    pub fn validate(&self) -> Result<()> {
        if self.n_users == 0 {
            return Err(SurvivalError::invalid_parameter("n_users", self.n_users));
        }
        if self.signup_window_days == 0 {
            return Err(SurvivalError::invalid_parameter(
                "signup_window_days",
                self.signup_window_days,
            ));
        }
        if !(self.study_horizon.is_finite() && self.study_horizon > 0.0) {
            return Err(SurvivalError::invalid_parameter("study_horizon", self.study_horizon));
        }
        if !(self.base_hazard.is_finite() && self.base_hazard > 0.0) {
            return Err(SurvivalError::invalid_parameter("base_hazard", self.base_hazard));
        }

        for (name, factor) in [
            ("premium_risk_factor", self.premium_risk_factor),
            ("high_activity_risk_factor", self.high_activity_risk_factor),
        ] {
            if !(factor > 0.0 && factor <= 1.0) {
                return Err(SurvivalError::invalid_parameter(name, factor));
            }
        }

        // both tiers and both activity levels must be populated for the comparisons
        if !(self.premium_share > 0.0 && self.premium_share < 1.0) {
            return Err(SurvivalError::invalid_parameter("premium_share", self.premium_share));
        }
        if self.high_activity_threshold == 0 {
            return Err(SurvivalError::invalid_parameter(
                "high_activity_threshold",
                self.high_activity_threshold,
            ));
        }

        let weights = self.user_type_weights.as_array();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || weights.iter().sum::<f64>() <= 0.0 {
            return Err(SurvivalError::invalid_parameter(
                "user_type_weights",
                format!("{:?}", weights),
            ));
        }

        if !(self.mean_interviews.is_finite() && self.mean_interviews >= 0.0) {
            return Err(SurvivalError::invalid_parameter("mean_interviews", self.mean_interviews));
        }
        if !(self.score_sd.is_finite() && self.score_sd >= 0.0) {
            return Err(SurvivalError::invalid_parameter("score_sd", self.score_sd));
        }

        if self.checkpoints.is_empty() {
            return Err(SurvivalError::invalid_parameter("checkpoints", "[]"));
        }
        if let Some(bad) = self
            .checkpoints
            .iter()
            .find(|&&t| !(0.0..=self.study_horizon).contains(&t))
        {
            return Err(SurvivalError::invalid_parameter("checkpoints", bad));
        }

        for (name, level) in [
            ("significance_level", self.significance_level),
            ("confidence_level", self.confidence_level),
        ] {
            if !(level > 0.0 && level < 1.0) {
                return Err(SurvivalError::invalid_parameter(name, level));
            }
        }

        Ok(())
    }
}

/// fixed output layout under a root directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    root: PathBuf,
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self::new("output")
    }
}

impl OutputPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn plots_dir(&self) -> PathBuf {
        self.root.join("visualizations")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root.join("reports")
    }

    pub fn users_csv(&self) -> PathBuf {
        self.data_dir().join("user_retention.csv")
    }

    pub fn plot(&self, file_name: &str) -> PathBuf {
        self.plots_dir().join(file_name)
    }

    pub fn summary_text(&self) -> PathBuf {
        self.reports_dir().join("survival_analysis_summary.txt")
    }

    pub fn summary_json(&self) -> PathBuf {
        self.reports_dir().join("survival_analysis_summary.json")
    }

    /// the three directories the writers expect to exist
    pub fn directories(&self) -> [PathBuf; 3] {
        [self.data_dir(), self.plots_dir(), self.reports_dir()]
    }
}
