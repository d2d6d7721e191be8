//! synthetic user cohort - the data generator.
//!
//! each user gets a constant hazard that starts at `base_hazard` and is scaled
//! down for premium subscribers and for users with enough interviews. churn
//! time is exponential in that hazard, right-censored at the study horizon.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    config::StudyConfig,
    error::Result,
    rng::SeededRng,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    JobSeeker,
    Interviewer,
    Recruiter,
}

impl UserType {
    /// draw order, matches `UserTypeWeights::as_array`
    pub const ALL: [UserType; 3] = [UserType::JobSeeker, UserType::Interviewer, UserType::Recruiter];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JobSeeker => "job_seeker",
            Self::Interviewer => "interviewer",
            Self::Recruiter => "recruiter",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    Premium,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// activity bucket derived from the interview count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Low,
    High,
}

impl ActivityLevel {
    pub fn from_interviews(num_interviews: u32, threshold: u32) -> Self {
        if num_interviews >= threshold {
            Self::High
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
        }
    }
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// one simulated user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: u32,
    pub signup_date: NaiveDate,
    pub user_type: UserType,
    pub subscription_tier: SubscriptionTier,
    pub num_interviews: u32,
    pub avg_score: f64,
    pub baseline_hazard: f64,
    /// uncensored draw, may exceed the horizon
    pub time_to_churn: f64,
    pub churned: bool,
    /// min(time_to_churn, horizon)
    pub time_observed: f64,
    pub last_active: NaiveDateTime,
    pub activity_level: ActivityLevel,
}

impl UserRecord {
    pub fn is_premium(&self) -> bool {
        self.subscription_tier == SubscriptionTier::Premium
    }
}

/// hazard after applying the risk reductions that apply to this user
pub fn user_hazard(config: &StudyConfig, tier: SubscriptionTier, num_interviews: u32) -> f64 {
    let mut hazard = config.base_hazard;
    if tier == SubscriptionTier::Premium {
        hazard *= config.premium_risk_factor;
    }
    if num_interviews >= config.high_activity_threshold {
        hazard *= config.high_activity_risk_factor;
    }
    hazard
}

/// right-censor an event time at the horizon: (observed duration, event flag)
pub fn censor(time_to_churn: f64, horizon: f64) -> (f64, bool) {
    let churned = time_to_churn <= horizon;
    (time_to_churn.min(horizon), churned)
}

fn offset_by_days(date: NaiveDate, days: f64) -> NaiveDateTime {
    let seconds = (days * 86_400.0).round() as i64;
    date.and_time(NaiveTime::MIN) + Duration::seconds(seconds)
}

/// generate the whole cohort. deterministic given `config.seed`.
///
/// attributes are drawn column by column (signup offsets for everyone, then
/// user types, and so on) so adding a user never perturbs the attributes of
/// the ones before it within a column.
pub fn generate_users(config: &StudyConfig) -> Result<Vec<UserRecord>> {
    config.validate()?;

    let n = config.n_users;
    let mut rng = SeededRng::new(config.seed);

    let signup_offsets: Vec<u32> = (0..n).map(|_| rng.below(config.signup_window_days)).collect();

    let type_weights = config.user_type_weights.as_array();
    let user_types: Vec<UserType> = (0..n)
        .map(|_| UserType::ALL[rng.choose_weighted(&type_weights)])
        .collect();

    let tiers: Vec<SubscriptionTier> = (0..n)
        .map(|_| {
            if rng.chance(config.premium_share) {
                SubscriptionTier::Premium
            } else {
                SubscriptionTier::Free
            }
        })
        .collect();

    let interviews: Vec<u32> = (0..n).map(|_| rng.poisson(config.mean_interviews)).collect();
    let scores: Vec<f64> = (0..n)
        .map(|_| rng.normal(config.score_mean, config.score_sd))
        .collect();

    let mut users = Vec::with_capacity(n);
    for i in 0..n {
        let baseline_hazard = user_hazard(config, tiers[i], interviews[i]);
        let time_to_churn = rng.exponential(baseline_hazard);
        let (time_observed, churned) = censor(time_to_churn, config.study_horizon);

        let signup_date = config.study_start + Duration::days(i64::from(signup_offsets[i]));

        users.push(UserRecord {
            user_id: (i + 1) as u32,
            signup_date,
            user_type: user_types[i],
            subscription_tier: tiers[i],
            num_interviews: interviews[i],
            avg_score: scores[i],
            baseline_hazard,
            time_to_churn,
            churned,
            time_observed,
            last_active: offset_by_days(signup_date, time_observed),
            activity_level: ActivityLevel::from_interviews(
                interviews[i],
                config.high_activity_threshold,
            ),
        });
    }

    let summary = CohortSummary::from_records(&users);
    log::info!(
        "generated {} users: {} churned ({:.1}%), {} active",
        summary.n_users,
        summary.churned,
        summary.churn_rate * 100.0,
        summary.active
    );

    Ok(users)
}

/// headline counts for the cohort
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CohortSummary {
    pub n_users: usize,
    pub churned: usize,
    pub active: usize,
    pub churn_rate: f64,
    pub premium: usize,
    pub high_activity: usize,
}

impl CohortSummary {
    pub fn from_records(users: &[UserRecord]) -> Self {
        let n_users = users.len();
        let churned = users.iter().filter(|u| u.churned).count();
        let churn_rate = if n_users > 0 {
            churned as f64 / n_users as f64
        } else {
            0.0
        };

        Self {
            n_users,
            churned,
            active: n_users - churned,
            churn_rate,
            premium: users.iter().filter(|u| u.is_premium()).count(),
            high_activity: users
                .iter()
                .filter(|u| u.activity_level == ActivityLevel::High)
                .count(),
        }
    }
}
