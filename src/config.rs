use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::engine_config::EngineToml;

/// Runtime configuration for one engine process.
///
/// Resolves every path in `ideation.toml` against the project directory and
/// carries the CLI overrides that apply to a run.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub log_dir: PathBuf,
    pub lock_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub prompts_dir: PathBuf,
    pub catalog_db: PathBuf,
    pub webhook_config: PathBuf,
    pub reasoning_cmd: String,
    pub dry_run: bool,
    pub verbose: bool,
    /// The parsed ideation.toml
    pub toml: EngineToml,
}

impl Config {
    pub fn new(project_dir: PathBuf, dry_run: bool, verbose: bool) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let toml = EngineToml::load_or_default(&project_dir)?;
        Ok(Self::from_toml(project_dir, toml, dry_run, verbose))
    }

    /// Build a config from an already-loaded toml without touching the filesystem.
    pub fn from_toml(project_dir: PathBuf, toml: EngineToml, dry_run: bool, verbose: bool) -> Self {
        let resolve = |p: &str| resolve_path(&project_dir, p);
        let output_dir = resolve(&toml.paths.output_dir);
        Self {
            data_dir: resolve(&toml.paths.data_dir),
            log_dir: resolve(&toml.paths.log_dir),
            lock_dir: resolve(&toml.concurrency.lock_dir),
            reports_dir: output_dir.join("reports"),
            prompts_dir: resolve(&toml.paths.prompts_dir),
            catalog_db: resolve(&toml.paths.catalog_db),
            webhook_config: resolve(&toml.notify.webhook_config),
            output_dir,
            reasoning_cmd: toml.reasoning_cmd(),
            dry_run,
            verbose,
            toml,
            project_dir,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir).context("Failed to create data directory")?;
        std::fs::create_dir_all(&self.output_dir).context("Failed to create output directory")?;
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        Ok(())
    }

    pub fn config_file(&self) -> PathBuf {
        self.project_dir.join(crate::engine_config::CONFIG_FILE_NAME)
    }

    pub fn archive_file(&self) -> PathBuf {
        self.data_dir.join("ideas_archive.jsonl")
    }

    pub fn artifact_file(&self) -> PathBuf {
        self.data_dir.join("dashboard_batches.jsonl")
    }

    pub fn feedback_file(&self) -> PathBuf {
        self.data_dir.join("feedback.jsonl")
    }

    pub fn signal_cache_file(&self) -> PathBuf {
        self.data_dir.join("signal_cache.json")
    }

    pub fn run_history_file(&self) -> PathBuf {
        self.output_dir.join("runs.jsonl")
    }
}

fn resolve_path(base: &Path, p: &str) -> PathBuf {
    let path = Path::new(p);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_resolve_against_project_dir() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), false, false).unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(config.data_dir, root.join("data"));
        assert_eq!(config.log_dir, root.join("output/logs"));
        assert_eq!(config.lock_dir, root.join("output/locks"));
        assert_eq!(config.reports_dir, root.join("output/reports"));
        assert_eq!(
            config.catalog_db,
            root.join("data/public_api_catalog.sqlite3")
        );
        assert_eq!(config.archive_file(), root.join("data/ideas_archive.jsonl"));
    }

    #[test]
    fn test_absolute_paths_are_kept() {
        let dir = tempdir().unwrap();
        let abs = dir.path().join("elsewhere.sqlite3");
        let mut toml = EngineToml::default();
        toml.paths.catalog_db = abs.to_string_lossy().to_string();
        let config = Config::from_toml(dir.path().to_path_buf(), toml, true, false);
        assert_eq!(config.catalog_db, abs);
        assert!(config.dry_run);
    }

    #[test]
    fn test_ensure_directories_creates_layout() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), false, false).unwrap();
        config.ensure_directories().unwrap();
        assert!(config.data_dir.is_dir());
        assert!(config.output_dir.is_dir());
        assert!(config.log_dir.is_dir());
    }

    #[test]
    fn test_reads_toml_from_project_dir() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("ideation.toml"),
            "[reasoning]\ncommand = \"fake-cli\"\n",
        )
        .unwrap();
        let config = Config::new(dir.path().to_path_buf(), false, true).unwrap();
        assert_eq!(config.reasoning_cmd, "fake-cli");
        assert!(config.verbose);
    }
}
