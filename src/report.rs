//! plain-text summary of a retention study.

use chrono::Duration;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::{
    analysis::{describe_curve_median, GroupComparison, KeyFinding, RetentionAnalysis},
    config::StudyConfig,
    error::Result,
    kaplan_meier::Checkpoint,
    model::p_clause,
};

fn percent(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.1}%", v * 100.0),
        None => "undefined (nobody observed that long)".to_string(),
    }
}

fn verdict(p_value: f64, alpha: f64) -> String {
    if p_value < alpha {
        format!("significant at alpha = {}", alpha)
    } else {
        format!("not significant at alpha = {}", alpha)
    }
}

fn checkpoint_line(f: &mut fmt::Formatter<'_>, indent: &str, checkpoint: &Checkpoint) -> fmt::Result {
    write!(
        f,
        "{}- {:.0}-day retention: {}",
        indent,
        checkpoint.time,
        percent(checkpoint.survival)
    )?;
    if let (Some(lo), Some(hi)) = (checkpoint.lower, checkpoint.upper) {
        write!(f, " [{:.1}%, {:.1}%]", lo * 100.0, hi * 100.0)?;
    }
    writeln!(f, " ({} at risk)", checkpoint.n_at_risk)
}

fn comparison_block(f: &mut fmt::Formatter<'_>, comparison: &GroupComparison, alpha: f64) -> fmt::Result {
    for (km, checkpoints) in comparison.groups() {
        writeln!(
            f,
            "   - {} (n = {}, {} churned) median survival: {}",
            km.label(),
            km.n_samples(),
            km.n_events(),
            describe_curve_median(km)
        )?;
        for checkpoint in checkpoints {
            checkpoint_line(f, "       ", checkpoint)?;
        }
    }

    let test = &comparison.test;
    writeln!(
        f,
        "   - Log-rank test: chi2 = {:.2}, {} ({})",
        test.statistic,
        p_clause(test.p_value),
        verdict(test.p_value, alpha)
    )?;
    writeln!(
        f,
        "   - Observed vs expected churn: {} {} / {:.1}, {} {} / {:.1}",
        comparison.a.label(),
        test.observed_a,
        test.expected_a,
        comparison.b.label(),
        test.observed_b,
        test.expected_b
    )
}

fn finding_line(f: &mut fmt::Formatter<'_>, label: &str, finding: &KeyFinding, level: f64) -> fmt::Result {
    let direction = if finding.risk_reduction_pct >= 0.0 { "lower" } else { "higher" };
    writeln!(
        f,
        "   - {}: {:.1}% {} churn risk (HR = {:.3}, {:.0}% CI [{:.3}, {:.3}], {})",
        label,
        finding.risk_reduction_pct.abs(),
        direction,
        finding.hazard_ratio,
        level * 100.0,
        finding.hr_lower,
        finding.hr_upper,
        p_clause(finding.p_value)
    )
}

/// the text report, every number taken from the analysis
pub struct SummaryReport<'a> {
    pub analysis: &'a RetentionAnalysis,
    pub config: &'a StudyConfig,
}

impl fmt::Display for SummaryReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (analysis, config) = (self.analysis, self.config);
        let alpha = config.significance_level;
        let last_signup = config.study_start
            + Duration::days(i64::from(config.signup_window_days.saturating_sub(1)));

        writeln!(f, "USER RETENTION ANALYSIS - SURVIVAL ANALYSIS RESULTS")?;
        writeln!(f)?;
        writeln!(
            f,
            "STUDY PERIOD: {:.0} days of follow-up per user (signups {} to {})",
            config.study_horizon,
            config.study_start.format("%Y-%m-%d"),
            last_signup.format("%Y-%m-%d")
        )?;
        writeln!(f, "SAMPLE SIZE: {} users (seed {})", analysis.cohort.n_users, config.seed)?;
        writeln!(f)?;

        writeln!(f, "1. OVERALL RETENTION METRICS")?;
        writeln!(f, "   - Median survival time: {}", describe_curve_median(&analysis.overall))?;
        for checkpoint in &analysis.overall_checkpoints {
            checkpoint_line(f, "   ", checkpoint)?;
        }
        writeln!(
            f,
            "   - Overall churn rate: {:.1}% ({} of {} users churned)",
            analysis.cohort.churn_rate * 100.0,
            analysis.cohort.churned,
            analysis.cohort.n_users
        )?;
        writeln!(f)?;

        writeln!(f, "2. SUBSCRIPTION TIER ANALYSIS (Kaplan-Meier)")?;
        comparison_block(f, &analysis.by_subscription, alpha)?;
        writeln!(f)?;

        writeln!(
            f,
            "3. ACTIVITY LEVEL ANALYSIS (low < {} interviews <= high)",
            config.high_activity_threshold
        )?;
        comparison_block(f, &analysis.by_activity, alpha)?;
        writeln!(f)?;

        let level = analysis.cox.confidence_level;
        writeln!(f, "4. COX REGRESSION - RISK FACTORS")?;
        finding_line(f, "Premium subscription", &analysis.premium_effect, level)?;
        finding_line(f, "Each additional interview", &analysis.interview_effect, level)?;
        writeln!(f, "   - User type and average score: controlled for in the model")?;
        writeln!(f)?;
        writeln!(f, "{}", analysis.cox)?;
        writeln!(f)?;

        writeln!(f, "TECHNICAL APPROACH:")?;
        writeln!(f, "   - Kaplan-Meier estimator with Greenwood log(-log) confidence bands")?;
        writeln!(f, "   - Log-rank tests for two-group comparisons")?;
        writeln!(
            f,
            "   - Cox proportional hazards regression (Breslow ties, Newton-Raphson, {} iterations)",
            analysis.cox.iterations
        )?;
        writeln!(
            f,
            "   - {:.0}% confidence intervals and two-sided p-values for all estimates",
            level * 100.0
        )
    }
}

pub fn render_summary(analysis: &RetentionAnalysis, config: &StudyConfig) -> String {
    SummaryReport { analysis, config }.to_string()
}

pub fn write_summary<P: AsRef<Path>>(text: &str, path: P) -> Result<()> {
    fs::write(path, text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SurvivalError;

    fn setup() -> (RetentionAnalysis, StudyConfig) {
        let config = StudyConfig::new().with_n_users(500).with_seed(21);
        (RetentionAnalysis::run(&config).unwrap(), config)
    }

    #[test]
    fn test_report_interpolates_statistics() {
        let (analysis, config) = setup();
        let text = render_summary(&analysis, &config);

        assert!(text.contains("SAMPLE SIZE: 500 users"));
        assert!(text.contains("30-day retention"));
        assert!(text.contains("120-day retention"));
        assert!(text.contains("Free"));
        assert!(text.contains("Premium"));
        assert!(text.contains(&format!("{:.3}", analysis.premium_effect.hazard_ratio)));
        for row in &analysis.cox.rows {
            assert!(text.contains(&row.name));
        }
        assert!(!text.contains("p = <"));
    }

    #[test]
    fn test_report_lists_subgroup_checkpoints() {
        let (analysis, config) = setup();
        let text = render_summary(&analysis, &config);

        // overall, free, premium, low activity, high activity
        assert_eq!(text.matches("90-day retention").count(), 5);
        assert_eq!(text.matches("30-day retention").count(), 5);

        let premium_90 = analysis.by_subscription.checkpoints_b[2];
        assert_eq!(premium_90.time, 90.0);
        let line = format!("90-day retention: {}", percent(premium_90.survival));
        assert!(text.contains(&line));
    }

    #[test]
    fn test_undefined_checkpoint_is_explicit() {
        let (mut analysis, config) = setup();
        // a reading past the last observation has no estimate
        analysis.by_activity.checkpoints_a[0] = Checkpoint {
            time: 150.0,
            n_at_risk: 0,
            survival: None,
            lower: None,
            upper: None,
        };
        let text = render_summary(&analysis, &config);
        assert!(text.contains("150-day retention: undefined (nobody observed that long) (0 at risk)"));
    }

    #[test]
    fn test_percent_and_verdict() {
        assert_eq!(percent(Some(0.8123)), "81.2%");
        assert!(percent(None).starts_with("undefined"));
        assert_eq!(verdict(0.01, 0.05), "significant at alpha = 0.05");
        assert_eq!(verdict(0.2, 0.05), "not significant at alpha = 0.05");
    }

    #[test]
    fn test_write_summary_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_summary("x", dir.path().join("nope").join("r.txt")).unwrap_err();
        assert!(matches!(err, SurvivalError::Io(_)));

        let ok = dir.path().join("r.txt");
        write_summary("hello", &ok).unwrap();
        assert_eq!(std::fs::read_to_string(ok).unwrap(), "hello");
    }
}
