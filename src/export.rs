//! csv + json output.
//!
//! writers never create directories; a missing parent surfaces as
//! `SurvivalError::Io` so the run aborts instead of silently skipping output.

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::{
    analysis::RetentionAnalysis,
    config::StudyConfig,
    error::Result,
    simulate::UserRecord,
};

pub const USER_CSV_HEADER: &str = "user_id,signup_date,user_type,subscription_tier,num_interviews,avg_score,baseline_hazard,time_to_churn,churned,time_observed,last_active_date,activity_level";

/// one row per simulated user
pub fn write_users_csv<P: AsRef<Path>>(users: &[UserRecord], path: P) -> Result<()> {
    let mut file = BufWriter::new(File::create(path)?);

    writeln!(file, "{}", USER_CSV_HEADER)?;

    for user in users {
        writeln!(
            file,
            "{},{},{},{},{},{:.6},{:.6},{:.6},{},{:.6},{},{}",
            user.user_id,
            user.signup_date.format("%Y-%m-%d"),
            user.user_type,
            user.subscription_tier,
            user.num_interviews,
            user.avg_score,
            user.baseline_hazard,
            user.time_to_churn,
            u8::from(user.churned),
            user.time_observed,
            user.last_active.format("%Y-%m-%d %H:%M:%S"),
            user.activity_level,
        )?;
    }

    file.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct SummaryDocument<'a> {
    config: &'a StudyConfig,
    #[serde(flatten)]
    analysis: &'a RetentionAnalysis,
}

/// machine-readable dump of the config and every computed statistic
pub fn write_summary_json<P: AsRef<Path>>(
    analysis: &RetentionAnalysis,
    config: &StudyConfig,
    path: P,
) -> Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut file, &SummaryDocument { config, analysis })?;
    writeln!(file)?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulate::generate_users;
    use crate::error::SurvivalError;
    use tempfile::tempdir;

    fn small_config() -> StudyConfig {
        StudyConfig::new().with_n_users(300).with_seed(11)
    }

    #[test]
    fn test_users_csv_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.csv");
        let users = generate_users(&small_config()).unwrap();

        write_users_csv(&users, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), users.len() + 1);
        assert_eq!(lines[0], USER_CSV_HEADER);

        let columns = USER_CSV_HEADER.split(',').count();
        for line in &lines[1..] {
            assert_eq!(line.split(',').count(), columns);
        }

        let first: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(first[0], "1");
        assert_eq!(first[2], users[0].user_type.as_str());
        assert_eq!(first[8], if users[0].churned { "1" } else { "0" });
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("no_such_dir").join("users.csv");
        let users = generate_users(&small_config()).unwrap();

        let err = write_users_csv(&users, &path).unwrap_err();
        assert!(matches!(err, SurvivalError::Io(_)));
    }

    #[test]
    fn test_summary_json_parses() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let config = small_config();
        let analysis = RetentionAnalysis::run(&config).unwrap();

        write_summary_json(&analysis, &config, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["config"]["n_users"], 300);
        assert_eq!(value["cohort"]["n_users"], 300);
        assert!(value["cox"]["rows"].as_array().unwrap().len() == 5);
        assert!(value["by_subscription"]["test"]["p_value"].is_number());
    }
}
