use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::util::read_jsonl;

const SUMMARY_LIMIT: usize = 20;

/// One operator action on a published idea.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub hypothesis_id: String,
    pub action: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedbackSummary {
    pub blacklisted: Vec<String>,
    pub liked: Vec<String>,
}

impl FeedbackSummary {
    pub fn is_empty(&self) -> bool {
        self.blacklisted.is_empty() && self.liked.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct FeedbackLog {
    path: PathBuf,
}

impl FeedbackLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The last twenty blacklisted and liked ids, oldest first.
    pub fn summary(&self) -> Result<FeedbackSummary> {
        let records: Vec<FeedbackRecord> = read_jsonl(&self.path)?;
        let last = |action: &str| {
            let ids: Vec<String> = records
                .iter()
                .filter(|r| r.action == action)
                .map(|r| r.hypothesis_id.clone())
                .collect();
            let skip = ids.len().saturating_sub(SUMMARY_LIMIT);
            ids.into_iter().skip(skip).collect::<Vec<_>>()
        };
        Ok(FeedbackSummary {
            blacklisted: last("blacklist"),
            liked: last("like"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::append_jsonl;
    use tempfile::tempdir;

    #[test]
    fn test_summary_keeps_last_twenty_per_action() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feedback.jsonl");
        for i in 0..25 {
            append_jsonl(
                &path,
                &FeedbackRecord {
                    hypothesis_id: format!("H-{:03}", i),
                    action: "blacklist".into(),
                },
            )
            .unwrap();
        }
        append_jsonl(
            &path,
            &FeedbackRecord {
                hypothesis_id: "H-100".into(),
                action: "like".into(),
            },
        )
        .unwrap();

        let summary = FeedbackLog::new(&path).summary().unwrap();
        assert_eq!(summary.blacklisted.len(), 20);
        assert_eq!(summary.blacklisted[0], "H-005");
        assert_eq!(summary.liked, vec!["H-100"]);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let summary = FeedbackLog::new(dir.path().join("none.jsonl")).summary().unwrap();
        assert!(summary.is_empty());
    }
}
