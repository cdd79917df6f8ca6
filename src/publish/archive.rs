use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::candidate::Candidate;
use crate::util::{append_jsonl, read_jsonl};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedIdea {
    #[serde(flatten)]
    pub idea: Candidate,
    pub batch_id: String,
    pub archived_at: DateTime<Utc>,
}

/// Every published idea, one JSON line each. Feeds dedup and the
/// "recently generated" list in the generation prompt.
#[derive(Debug, Clone)]
pub struct IdeaArchive {
    path: PathBuf,
}

impl IdeaArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn append(&self, batch_id: &str, ideas: &[Candidate], now: DateTime<Utc>) -> Result<usize> {
        for idea in ideas {
            append_jsonl(
                &self.path,
                &ArchivedIdea {
                    idea: idea.clone(),
                    batch_id: batch_id.to_string(),
                    archived_at: now,
                },
            )?;
        }
        Ok(ideas.len())
    }

    pub fn all(&self) -> Result<Vec<ArchivedIdea>> {
        read_jsonl(&self.path)
    }

    pub fn recent(&self, hours: i64, now: DateTime<Utc>) -> Result<Vec<ArchivedIdea>> {
        let cutoff = now - Duration::hours(hours);
        Ok(self
            .all()?
            .into_iter()
            .filter(|a| a.archived_at >= cutoff)
            .collect())
    }

    pub fn service_names(&self, hours: i64, now: DateTime<Utc>) -> Result<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        for archived in self.recent(hours, now)? {
            let name = archived.idea.service_name;
            if !name.is_empty() && !names.contains(&name) {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Texts of every archived idea, for building historical dedup vectors.
    pub fn historical_texts(&self) -> Result<Vec<String>> {
        Ok(self
            .all()?
            .iter()
            .map(|a| a.idea.embedding_text())
            .filter(|t| !t.is_empty())
            .collect())
    }
}
