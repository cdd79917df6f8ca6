use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::candidate::Candidate;
use crate::util::{append_jsonl, read_jsonl};

pub const ARTIFACT_SCHEMA_VERSION: &str = "1.0";

/// One run's graded ideas, as read by the dashboard and reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRecord {
    pub schema_version: String,
    pub batch_id: String,
    pub timestamp: DateTime<Utc>,
    pub ideas: Vec<Candidate>,
}

/// Append-only JSONL log of [`BatchRecord`]s.
#[derive(Debug, Clone)]
pub struct ArtifactLog {
    path: PathBuf,
}

impl ArtifactLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, batch_id: &str, timestamp: DateTime<Utc>, ideas: &[Candidate]) -> Result<()> {
        let record = BatchRecord {
            schema_version: ARTIFACT_SCHEMA_VERSION.to_string(),
            batch_id: batch_id.to_string(),
            timestamp,
            ideas: ideas.to_vec(),
        };
        append_jsonl(&self.path, &record)
    }

    pub fn read_all(&self) -> Result<Vec<BatchRecord>> {
        read_jsonl(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_and_read() {
        let dir = tempdir().unwrap();
        let log = ArtifactLog::new(dir.path().join("data/dashboard_batches.jsonl"));
        log.append("b1", Utc::now(), &[Candidate::new("H-001", "X")]).unwrap();
        log.append("b2", Utc::now(), &[]).unwrap();

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].schema_version, "1.0");
        assert_eq!(records[0].ideas[0].id, "H-001");
        assert_eq!(records[1].batch_id, "b2");
    }

    #[test]
    fn test_missing_log_reads_empty() {
        let dir = tempdir().unwrap();
        assert!(ArtifactLog::new(dir.path().join("none.jsonl")).read_all().unwrap().is_empty());
    }
}
