use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::outputs::StageOutputs;
use crate::util::{append_jsonl, read_jsonl, round_to};

/// The record of one pipeline run, finalized exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub batch_id: String,
    pub started_at: DateTime<Utc>,
    pub stages: StageOutputs,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub total_duration_sec: f64,
}

impl RunRecord {
    pub fn start(batch_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            batch_id: batch_id.into(),
            started_at,
            stages: StageOutputs::default(),
            success: false,
            error: None,
            finished_at: None,
            total_duration_sec: 0.0,
        }
    }

    pub fn finish(&mut self, error: Option<String>, finished_at: DateTime<Utc>, duration_sec: f64) {
        self.success = error.is_none();
        self.error = error;
        self.finished_at = Some(finished_at);
        self.total_duration_sec = round_to(duration_sec, 1);
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

/// Append-only history of finished runs.
pub struct RunHistory {
    path: PathBuf,
}

impl RunHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn append(&self, record: &RunRecord) -> Result<()> {
        append_jsonl(&self.path, record)
    }

    pub fn entries(&self) -> Result<Vec<RunRecord>> {
        read_jsonl(&self.path)
    }

    pub fn last(&self) -> Result<Option<RunRecord>> {
        Ok(self.entries()?.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_history() -> (RunHistory, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runs.jsonl");
        (RunHistory::new(path), dir)
    }

    #[test]
    fn test_empty_history() {
        let (history, _dir) = make_history();
        assert!(history.entries().unwrap().is_empty());
        assert!(history.last().unwrap().is_none());
    }

    #[test]
    fn test_finish_sets_success_from_error() {
        let mut ok = RunRecord::start("b1", Utc::now());
        ok.finish(None, Utc::now(), 12.34);
        assert!(ok.success);
        assert!(ok.is_finished());
        assert_eq!(ok.total_duration_sec, 12.3);

        let mut failed = RunRecord::start("b2", Utc::now());
        failed.finish(Some("boom".into()), Utc::now(), 1.0);
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_append_and_read_back() {
        let (history, _dir) = make_history();
        let mut a = RunRecord::start("a", Utc::now());
        a.finish(None, Utc::now(), 5.0);
        let mut b = RunRecord::start("b", Utc::now());
        b.finish(Some("x".into()), Utc::now(), 6.0);
        history.append(&a).unwrap();
        history.append(&b).unwrap();

        let entries = history.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], a);
        assert_eq!(history.last().unwrap().unwrap().batch_id, "b");
    }
}
