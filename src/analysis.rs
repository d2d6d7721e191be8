//! the full retention study, start to finish.
//!
//! cohort -> overall curve -> tier and activity comparisons -> cox model.
//! everything downstream (csv, plots, report) reads from `RetentionAnalysis`.

use serde::Serialize;

use crate::{
    config::StudyConfig,
    data::SurvivalData,
    error::{Result, SurvivalError},
    kaplan_meier::{Checkpoint, KaplanMeier},
    logrank::LogRankTest,
    model::{CoefficientRow, CoxModel, CoxSummary},
    simulate::{generate_users, ActivityLevel, CohortSummary, SubscriptionTier, UserRecord},
};

/// two survival curves plus the test that compares them
#[derive(Debug, Clone, Serialize)]
pub struct GroupComparison {
    pub a: KaplanMeier,
    pub b: KaplanMeier,
    /// each curve read off at the study checkpoints
    pub checkpoints_a: Vec<Checkpoint>,
    pub checkpoints_b: Vec<Checkpoint>,
    pub test: LogRankTest,
}

impl GroupComparison {
    /// split users by `in_b`, fit a curve per side, read both at the
    /// checkpoints and run the log-rank test
    pub fn split<F>(
        users: &[UserRecord],
        label_a: &str,
        label_b: &str,
        confidence_level: f64,
        checkpoints: &[f64],
        in_b: F,
    ) -> Result<Self>
    where
        F: Fn(&UserRecord) -> bool,
    {
        let (group_b, group_a): (Vec<&UserRecord>, Vec<&UserRecord>) =
            users.iter().partition(|u| in_b(*u));

        let (times_a, events_a) = durations(&group_a);
        let (times_b, events_b) = durations(&group_b);

        let a = KaplanMeier::fit(label_a, &times_a, &events_a, confidence_level)?;
        let b = KaplanMeier::fit(label_b, &times_b, &events_b, confidence_level)?;
        let test = LogRankTest::compare(&times_a, &events_a, &times_b, &events_b)?;

        Ok(Self {
            checkpoints_a: a.checkpoints(checkpoints),
            checkpoints_b: b.checkpoints(checkpoints),
            a,
            b,
            test,
        })
    }

    /// (curve, its checkpoints) for both sides, a first
    pub fn groups(&self) -> [(&KaplanMeier, &[Checkpoint]); 2] {
        [
            (&self.a, self.checkpoints_a.as_slice()),
            (&self.b, self.checkpoints_b.as_slice()),
        ]
    }
}

fn durations(users: &[&UserRecord]) -> (Vec<f64>, Vec<bool>) {
    users.iter().map(|u| (u.time_observed, u.churned)).unzip()
}

/// a covariate effect phrased for the reader
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyFinding {
    pub covariate: String,
    pub hazard_ratio: f64,
    pub hr_lower: f64,
    pub hr_upper: f64,
    pub p_value: f64,
    /// positive = lower churn risk
    pub risk_reduction_pct: f64,
}

impl KeyFinding {
    fn from_row(row: &CoefficientRow) -> Self {
        Self {
            covariate: row.name.clone(),
            hazard_ratio: row.hazard_ratio,
            hr_lower: row.hr_lower,
            hr_upper: row.hr_upper,
            p_value: row.p_value,
            risk_reduction_pct: -row.risk_change_pct(),
        }
    }
}

/// everything computed by one run of the study
#[derive(Debug, Clone, Serialize)]
pub struct RetentionAnalysis {
    #[serde(skip)]
    pub users: Vec<UserRecord>,
    pub cohort: CohortSummary,
    pub overall: KaplanMeier,
    pub overall_checkpoints: Vec<Checkpoint>,
    pub by_subscription: GroupComparison,
    pub by_activity: GroupComparison,
    pub cox: CoxSummary,
    pub premium_effect: KeyFinding,
    pub interview_effect: KeyFinding,
}

impl RetentionAnalysis {
    pub fn run(config: &StudyConfig) -> Result<Self> {
        let users = generate_users(config)?;
        Self::from_users(config, users)
    }

    /// analyse an existing cohort
    pub fn from_users(config: &StudyConfig, users: Vec<UserRecord>) -> Result<Self> {
        config.validate()?;
        if users.is_empty() {
            return Err(SurvivalError::invalid_survival_data("no users to analyse"));
        }

        let level = config.confidence_level;
        let cohort = CohortSummary::from_records(&users);

        let times: Vec<f64> = users.iter().map(|u| u.time_observed).collect();
        let events: Vec<bool> = users.iter().map(|u| u.churned).collect();
        let overall = KaplanMeier::fit("Overall", &times, &events, level)?;
        let overall_checkpoints = overall.checkpoints(&config.checkpoints);
        log::info!(
            "overall retention: {} users, {} churned, median {}",
            overall.n_samples(),
            overall.n_events(),
            describe_curve_median(&overall)
        );

        let by_subscription = GroupComparison::split(
            &users,
            "Free",
            "Premium",
            level,
            &config.checkpoints,
            |u| u.subscription_tier == SubscriptionTier::Premium,
        )?;
        log_comparison("subscription tier", &by_subscription);

        let by_activity = GroupComparison::split(
            &users,
            "Low activity",
            "High activity",
            level,
            &config.checkpoints,
            |u| u.activity_level == ActivityLevel::High,
        )?;
        log_comparison("activity level", &by_activity);

        let data = SurvivalData::from_records(&users)?;
        let mut model = CoxModel::new().with_confidence_level(level);
        model.fit(&data)?;
        let cox = model.summary()?;

        let premium_effect = finding(&cox, "subscription_tier_premium")?;
        let interview_effect = finding(&cox, "num_interviews")?;
        log::info!(
            "premium hazard ratio {:.3} ({:.1}% lower churn risk), per-interview hazard ratio {:.3}",
            premium_effect.hazard_ratio,
            premium_effect.risk_reduction_pct,
            interview_effect.hazard_ratio
        );

        Ok(Self {
            users,
            cohort,
            overall,
            overall_checkpoints,
            by_subscription,
            by_activity,
            cox,
            premium_effect,
            interview_effect,
        })
    }
}

fn finding(cox: &CoxSummary, covariate: &str) -> Result<KeyFinding> {
    cox.row(covariate)
        .map(KeyFinding::from_row)
        .ok_or_else(|| SurvivalError::invalid_parameter("covariate", covariate))
}

fn log_comparison(name: &str, comparison: &GroupComparison) {
    log::info!(
        "{}: {} median {}, {} median {}, log-rank chi2 = {:.2}, p = {:.3e}",
        name,
        comparison.a.label(),
        describe_curve_median(&comparison.a),
        comparison.b.label(),
        describe_curve_median(&comparison.b),
        comparison.test.statistic,
        comparison.test.p_value
    );
}

/// `None` means the curve never dropped to 50%
pub fn describe_median(median: Option<f64>) -> String {
    match median {
        Some(days) => format!("{:.1} days", days),
        None => "not reached".to_string(),
    }
}

/// like `describe_median` but says why when a group never churned at all
pub fn describe_curve_median(km: &KaplanMeier) -> String {
    if km.has_events() {
        describe_median(km.median())
    } else {
        "not reached (no events)".to_string()
    }
}
