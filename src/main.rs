//! churn-report: runs the retention study and writes every artifact under
//! `output/`.
//!
//! Usage:
//!   churn-report
//!   RUST_LOG=debug churn-report

use anyhow::{Context, Result};
use churn_survival::{
    analysis::RetentionAnalysis,
    config::{OutputPaths, StudyConfig},
    export, plot, report,
};
use std::fs;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = StudyConfig::default();
    let paths = OutputPaths::default();

    for dir in paths.directories() {
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
    }

    let analysis = RetentionAnalysis::run(&config).context("running retention analysis")?;

    let csv = paths.users_csv();
    export::write_users_csv(&analysis.users, &csv)
        .with_context(|| format!("writing {}", csv.display()))?;
    log::info!("saved {} user records to {}", analysis.users.len(), csv.display());

    plot::write_all(&analysis, &paths).context("writing charts")?;

    let summary = report::render_summary(&analysis, &config);
    let summary_path = paths.summary_text();
    report::write_summary(&summary, &summary_path)
        .with_context(|| format!("writing {}", summary_path.display()))?;

    let json_path = paths.summary_json();
    export::write_summary_json(&analysis, &config, &json_path)
        .with_context(|| format!("writing {}", json_path.display()))?;

    println!("{summary}");
    log::info!("full report saved to {}", summary_path.display());

    Ok(())
}
