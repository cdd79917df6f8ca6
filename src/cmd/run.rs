//! Pipeline execution: `ideation once` and `ideation loop`.

use anyhow::Result;
use chrono::{DateTime, Local, Timelike};
use std::path::PathBuf;
use std::time::Duration;

use super::super::{Cli, RunArgs};
use ideation::config::Config;
use ideation::logging::init_logging;
use ideation::orchestrator::{Orchestrator, RunInput, RunOutcome, RunRecord};

fn run_input(args: &RunArgs) -> RunInput {
    RunInput {
        manual_signals: args.manual_signals.clone(),
        assumptions: args.assumptions.clone(),
    }
}

pub async fn cmd_once(cli: &Cli, project_dir: PathBuf, args: &RunArgs) -> Result<i32> {
    let config = Config::new(project_dir, args.dry_run, cli.verbose)?;
    let _guard = init_logging(&config.log_dir, cli.verbose, cli.log_json)?;

    let orchestrator = Orchestrator::from_config(config);
    let outcome = orchestrator.run(&run_input(args)).await?;
    match &outcome {
        RunOutcome::Rejected => {
            println!(
                "{}",
                console::style("All run slots busy, nothing ran.").yellow()
            );
        }
        RunOutcome::Completed(record) => report(record, args.json)?,
    }
    Ok(outcome.exit_code())
}

pub async fn cmd_loop(cli: &Cli, project_dir: PathBuf, args: &RunArgs) -> Result<()> {
    let config = Config::new(project_dir, args.dry_run, cli.verbose)?;
    let _guard = init_logging(&config.log_dir, cli.verbose, cli.log_json)?;

    let orchestrator = Orchestrator::from_config(config);
    let input = run_input(args);
    println!(
        "{}",
        console::style("Ideation loop started, running now and then at the top of every hour (Ctrl+C to stop)")
            .bold()
            .cyan()
    );

    loop {
        match orchestrator.run(&input).await {
            Ok(RunOutcome::Completed(record)) => report(&record, args.json)?,
            Ok(RunOutcome::Rejected) => {
                tracing::warn!("Scheduled run skipped, all slots busy");
            }
            Err(e) => tracing::error!(error = %e, "Scheduled run could not start"),
        }

        let wait = until_next_hour(Local::now());
        tracing::info!(wait_sec = wait.as_secs(), "Waiting for next scheduled run");
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                println!("{}", console::style("Interrupted, stopping loop.").yellow());
                return Ok(());
            }
        }
    }
}

/// Time left until the next `HH:00:00` local time.
pub fn until_next_hour(now: DateTime<Local>) -> Duration {
    let into_hour = u64::from(now.minute()) * 60 + u64::from(now.second());
    Duration::from_secs(3600 - into_hour)
}

fn report(record: &RunRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
    } else {
        print_summary(record);
    }
    Ok(())
}

fn print_summary(record: &RunRecord) {
    println!();
    if record.success {
        println!(
            "{} {}",
            console::style("Batch").bold(),
            console::style(&record.batch_id).green().bold()
        );
    } else {
        println!(
            "{} {} {}",
            console::style("Batch").bold(),
            console::style(&record.batch_id).red().bold(),
            console::style("FAILED").red()
        );
        if let Some(error) = &record.error {
            println!("  {} {}", console::style("Error:").red().bold(), error);
        }
    }

    let stages = &record.stages;
    if let Some(context) = &stages.context {
        println!("  signals:    {}", context.signals.len());
    }
    if let Some(generation) = &stages.generation {
        println!("  candidates: {}", generation.candidates.len());
    }
    if let Some(matching) = &stages.matching {
        println!("  feasible:   {}", matching.passed.len());
    }
    if let Some(validation) = &stages.validation {
        println!(
            "  validated:  {} ({})",
            validation.passed.len(),
            validation.depth
        );
    }
    if let Some(scoring) = &stages.scoring {
        println!(
            "  graded:     {} ({} duplicate)",
            scoring.graded.len(),
            scoring.duplicates.len()
        );
        for idea in scoring.graded.iter().take(5) {
            let grade = idea
                .grade()
                .map(|g| g.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "    [{}] {:.2} {}",
                grade,
                idea.weighted_score(),
                idea.service_name
            );
        }
    }
    if let Some(publication) = &stages.publication {
        println!(
            "  published:  {} ({} alert(s) sent)",
            publication.published, publication.notifications_sent
        );
    }
    println!(
        "  {}",
        console::style(format!("{:.1}s total", record.total_duration_sec)).dim()
    );
}
