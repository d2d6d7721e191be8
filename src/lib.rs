//! # churn survival
//!
//! user retention as a survival problem - simulate a cohort, estimate how long
//! users stick around, and find out what keeps them.
//!
//! ## what you get
//!
//! - seeded cohort simulation w/ right-censoring at the study horizon
//! - kaplan-meier curves with greenwood confidence bands
//! - log-rank tests for two-group comparisons
//! - cox regression (newton-raphson, breslow ties) w/ hazard ratios & CIs
//! - csv, json, svg and plain text output
//!
//! ## quick start
//!
//! ```rust
//! use churn_survival::{CoxModel, SurvivalData};
//! use ndarray::Array2;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // setup some survival data
//! let times = vec![1.0, 2.5, 3.2, 4.1, 5.0, 6.3];
//! let events = vec![true, false, true, true, false, true]; // true = churned, false = censored
//! let covariates = Array2::from_shape_vec((6, 2), vec![
//!     1.0, 0.5,  // user features
//!     2.0, 1.0,
//!     1.5, 0.0,
//!     3.0, 1.5,
//!     0.5, 1.0,
//!     2.5, 0.0,
//! ])?;
//! let data = SurvivalData::new(times, events, covariates)?;
//!
//! let mut model = CoxModel::new().with_l2_penalty(0.1); // ridge
//! model.fit(&data)?;
//!
//! // hazard ratios are exp(coef)
//! let summary = model.summary()?;
//! for row in &summary.rows {
//!     println!("{}: HR = {:.3}", row.name, row.hazard_ratio);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! the whole study in one call:
//!
//! ```rust,no_run
//! use churn_survival::{RetentionAnalysis, StudyConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let analysis = RetentionAnalysis::run(&StudyConfig::default())?;
//! println!("{}", analysis.cox);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod kaplan_meier;
pub mod logrank;
pub mod metrics;
pub mod model;
pub mod optimization;
pub mod plot;
pub mod report;
pub mod rng;
pub mod simulate;
pub mod stats;

pub use analysis::{GroupComparison, RetentionAnalysis};
pub use config::{OutputPaths, StudyConfig};
pub use data::SurvivalData;
pub use error::{Result, SurvivalError};
pub use kaplan_meier::KaplanMeier;
pub use logrank::LogRankTest;
pub use model::{CoxModel, CoxSummary};
pub use simulate::{generate_users, UserRecord};
