//! Checks that must pass before any stage runs.

use std::time::Duration;
use tracing::{info, warn};

use super::collaborators::Collaborators;
use crate::config::Config;
use crate::errors::PipelineError;
use crate::invoker::CliRunner;

pub const MIN_FREE_DISK_BYTES: u64 = 100 * 1024 * 1024;
const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

pub fn check_disk_space(available: u64) -> Option<String> {
    (available < MIN_FREE_DISK_BYTES).then(|| {
        format!(
            "Low disk space: {} MB free, need {} MB",
            available / (1024 * 1024),
            MIN_FREE_DISK_BYTES / (1024 * 1024)
        )
    })
}

/// Run every check and return the collaborators for the run.
///
/// `provided` collaborators skip construction and the reasoning CLI probe,
/// but are still checked for a non-empty catalog and renderable prompts.
pub async fn run_preflight(
    config: &Config,
    provided: Option<Collaborators>,
    needs_collection: bool,
) -> Result<Collaborators, PipelineError> {
    let mut failures = Vec::new();

    if let Err(e) = config.ensure_directories() {
        failures.push(format!("Cannot prepare directories: {:#}", e));
    }

    match fs2::available_space(&config.output_dir) {
        Ok(available) => failures.extend(check_disk_space(available)),
        Err(e) => warn!(error = %e, "Disk space probe failed, skipping check"),
    }

    if provided.is_none() && !config.dry_run {
        let runner = CliRunner::new(&config.reasoning_cmd, Vec::new());
        if let Err(e) = runner.check_version(VERSION_PROBE_TIMEOUT).await {
            failures.push(format!("Reasoning CLI '{}' unavailable: {}", config.reasoning_cmd, e));
        }
    }

    let collaborators = match provided {
        Some(c) => Some(c),
        None => match Collaborators::build(config, needs_collection).await {
            Ok(c) => Some(c),
            Err(errs) => {
                failures.extend(errs);
                None
            }
        },
    };

    if let Some(c) = &collaborators {
        match c.catalog.call(|db| db.count()).await {
            Ok(0) => failures.push("Catalog is empty".to_string()),
            Ok(n) => info!(apis = n, "Catalog reachable"),
            Err(e) => failures.push(format!("Catalog query failed: {:#}", e)),
        }
        failures.extend(c.prompts.check());
    }

    match collaborators {
        Some(c) if failures.is_empty() => {
            info!("Pre-flight checks passed");
            Ok(c)
        }
        _ => {
            for f in &failures {
                warn!(failure = %f, "Pre-flight check failed");
            }
            Err(PipelineError::Preflight(failures))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_space_threshold() {
        assert!(check_disk_space(MIN_FREE_DISK_BYTES).is_none());
        let msg = check_disk_space(MIN_FREE_DISK_BYTES - 1).unwrap();
        assert!(msg.contains("99 MB free"));
    }
}
