//! Summary reports over the run artifact: `ideation report`.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, Utc};
use std::path::PathBuf;

use super::super::{Cli, ReportCommands};
use ideation::config::Config;
use ideation::logging::init_logging;
use ideation::publish::ArtifactLog;
use ideation::report::{daily_report, weekly_report, write_report};

pub fn cmd_report(cli: &Cli, project_dir: PathBuf, command: ReportCommands) -> Result<()> {
    let config = Config::new(project_dir, false, cli.verbose)?;
    let _guard = init_logging(&config.log_dir, cli.verbose, cli.log_json)?;

    let batches = ArtifactLog::new(config.artifact_file()).read_all()?;
    let now = Utc::now();
    let today = Local::now().date_naive();

    let (path, summary) = match command {
        ReportCommands::Daily { date } => {
            let date = match date {
                Some(d) => NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                    .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", d))?,
                None => today,
            };
            let report = daily_report(&batches, date, now);
            let path = write_report(&config.reports_dir, "daily", date, &report)?;
            let summary = format!(
                "{}: {} batch(es), {} idea(s), grades {:?}",
                date, report.total_batches, report.total_ideas, report.grade_distribution
            );
            (path, summary)
        }
        ReportCommands::Weekly => {
            let report = weekly_report(&batches, today, now);
            let path = write_report(&config.reports_dir, "weekly", today, &report)?;
            let summary = format!(
                "{} to {}: {} batch(es), {} idea(s), {} S/A",
                report.period_start,
                report.period_end,
                report.total_batches,
                report.total_ideas,
                report.sa_count
            );
            (path, summary)
        }
    };

    println!("{}", summary);
    println!(
        "{} {}",
        console::style("Report written to").dim(),
        path.display()
    );
    Ok(())
}
