use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::Signal;
use crate::util::atomic_json_write;

pub const CACHE_SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheFile {
    schema_version: String,
    #[serde(default)]
    cached_urls: BTreeMap<String, DateTime<Utc>>,
    #[serde(default)]
    rotation_index: usize,
}

impl Default for CacheFile {
    fn default() -> Self {
        Self {
            schema_version: CACHE_SCHEMA_VERSION.to_string(),
            cached_urls: BTreeMap::new(),
            rotation_index: 0,
        }
    }
}

/// TTL-keyed set of URLs already fed to the pipeline, plus the persisted
/// rotation position.
#[derive(Debug, Clone)]
pub struct UrlCache {
    path: PathBuf,
    ttl: Duration,
    state: CacheFile,
}

impl UrlCache {
    /// Load from disk. A missing or unreadable file starts an empty cache.
    pub fn load(path: &Path, ttl_hours: i64) -> Self {
        let state = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Signal cache unreadable, starting empty");
                CacheFile::default()
            }),
            Err(_) => CacheFile::default(),
        };
        Self {
            path: path.to_path_buf(),
            ttl: Duration::hours(ttl_hours),
            state,
        }
    }

    pub fn len(&self) -> usize {
        self.state.cached_urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.cached_urls.is_empty()
    }

    pub fn rotation_index(&self) -> usize {
        self.state.rotation_index
    }

    pub fn set_rotation_index(&mut self, index: usize) {
        self.state.rotation_index = index;
    }

    /// Drop entries older than the TTL.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let ttl = self.ttl;
        self.state.cached_urls.retain(|_, seen| now - *seen < ttl);
    }

    pub fn contains(&self, url: &str) -> bool {
        self.state.cached_urls.contains_key(url)
    }

    /// Keep signals whose URL is unseen (recording it) or that carry no URL.
    pub fn filter_new(&mut self, signals: Vec<Signal>, now: DateTime<Utc>) -> Vec<Signal> {
        self.prune(now);
        signals
            .into_iter()
            .filter(|signal| match &signal.url {
                Some(url) if self.state.cached_urls.contains_key(url) => false,
                Some(url) => {
                    self.state.cached_urls.insert(url.clone(), now);
                    true
                }
                None => true,
            })
            .collect()
    }

    /// Most recently cached URLs, newest first.
    pub fn recent_urls(&self, limit: usize) -> Vec<String> {
        let mut entries: Vec<_> = self.state.cached_urls.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        entries
            .into_iter()
            .take(limit)
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub fn save(&self) -> Result<()> {
        atomic_json_write(&self.path, &self.state)
    }
}
