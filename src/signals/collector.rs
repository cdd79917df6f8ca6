use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{Signal, SignalSource, SourceRotation, UrlCache};

/// What one collection pass produced.
#[derive(Debug, Clone, Default)]
pub struct CollectReport {
    pub signals: Vec<Signal>,
    pub sources_run: Vec<String>,
    pub sources_failed: Vec<String>,
    /// Signals dropped because their URL was already cached
    pub duplicates_dropped: usize,
}

/// Fans out to the always-on sources plus the rotation pick, concurrently.
pub struct SignalCollector {
    sources: BTreeMap<String, Arc<dyn SignalSource>>,
    always: Vec<String>,
    timeout: Duration,
}

impl SignalCollector {
    pub fn new(always: Vec<String>, timeout: Duration) -> Self {
        Self {
            sources: BTreeMap::new(),
            always,
            timeout,
        }
    }

    pub fn register(&mut self, source: Arc<dyn SignalSource>) {
        self.sources.insert(source.name().to_string(), source);
    }

    pub fn has_source(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Names referenced by `always` or `pool` that have no registered source.
    pub fn missing_sources(&self, pool: &[String]) -> Vec<String> {
        self.always
            .iter()
            .chain(pool.iter())
            .filter(|name| !self.has_source(name))
            .cloned()
            .collect()
    }

    /// Run one collection, advancing `rotation` and recording new URLs in `cache`.
    ///
    /// A source that fails or exceeds the timeout contributes nothing.
    pub async fn collect(
        &self,
        rotation: &mut SourceRotation,
        cache: &mut UrlCache,
        now: DateTime<Utc>,
    ) -> CollectReport {
        let mut names: Vec<String> = self.always.clone();
        for picked in rotation.advance() {
            if !names.contains(&picked) {
                names.push(picked);
            }
        }

        let fetches = names.iter().map(|name| async move {
            let Some(source) = self.sources.get(name) else {
                warn!(source = %name, "No signal source registered");
                return (name.clone(), None);
            };
            match tokio::time::timeout(self.timeout, source.fetch()).await {
                Ok(Ok(signals)) => (name.clone(), Some(signals)),
                Ok(Err(e)) => {
                    warn!(source = %name, error = %e, "Signal source failed");
                    (name.clone(), None)
                }
                Err(_) => {
                    warn!(source = %name, timeout_sec = self.timeout.as_secs(), "Signal source timed out");
                    (name.clone(), None)
                }
            }
        });

        let mut report = CollectReport::default();
        let mut gathered = Vec::new();
        for (name, result) in join_all(fetches).await {
            match result {
                Some(signals) => {
                    gathered.extend(signals);
                    report.sources_run.push(name);
                }
                None => report.sources_failed.push(name),
            }
        }

        let before = gathered.len();
        report.signals = cache.filter_new(gathered, now);
        report.duplicates_dropped = before - report.signals.len();
        cache.set_rotation_index(rotation.index());

        info!(
            signals = report.signals.len(),
            sources = ?report.sources_run,
            failed = ?report.sources_failed,
            duplicates = report.duplicates_dropped,
            "Collected signals"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::StaticSource;
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct FailingSource;

    #[async_trait]
    impl SignalSource for FailingSource {
        fn name(&self) -> &str {
            "tech"
        }
        async fn fetch(&self) -> anyhow::Result<Vec<Signal>> {
            anyhow::bail!("crawler down")
        }
    }

    struct SlowSource;

    #[async_trait]
    impl SignalSource for SlowSource {
        fn name(&self) -> &str {
            "policy"
        }
        async fn fetch(&self) -> anyhow::Result<Vec<Signal>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec![Signal::new("policy", "late")])
        }
    }

    fn collector() -> SignalCollector {
        let mut c = SignalCollector::new(vec!["trends".into()], Duration::from_millis(200));
        c.register(Arc::new(StaticSource::sample("trends")));
        c.register(Arc::new(StaticSource::sample("news")));
        c.register(Arc::new(FailingSource));
        c.register(Arc::new(SlowSource));
        c
    }

    fn pool() -> Vec<String> {
        vec!["news".into(), "tech".into(), "policy".into()]
    }

    #[tokio::test]
    async fn test_failed_and_slow_sources_contribute_nothing() {
        let dir = tempdir().unwrap();
        let mut cache = UrlCache::load(&dir.path().join("c.json"), 24);
        let mut rotation = SourceRotation::new(pool(), 3, 0);
        let report = collector().collect(&mut rotation, &mut cache, Utc::now()).await;
        assert_eq!(report.signals.len(), 4);
        assert_eq!(report.sources_run, vec!["trends", "news"]);
        assert_eq!(report.sources_failed, vec!["tech", "policy"]);
    }

    #[tokio::test]
    async fn test_second_pass_drops_cached_urls_and_advances_rotation() {
        let dir = tempdir().unwrap();
        let mut cache = UrlCache::load(&dir.path().join("c.json"), 24);
        let mut rotation = SourceRotation::new(pool(), 1, 0);
        let c = collector();

        let first = c.collect(&mut rotation, &mut cache, Utc::now()).await;
        assert_eq!(first.signals.len(), 4);
        assert_eq!(cache.rotation_index(), 1);

        let second = c.collect(&mut rotation, &mut cache, Utc::now()).await;
        assert_eq!(second.signals.len(), 0);
        assert_eq!(second.duplicates_dropped, 2);
        assert_eq!(second.sources_failed, vec!["tech"]);
    }

    #[test]
    fn test_missing_sources() {
        let c = collector();
        let missing = c.missing_sources(&["news".into(), "funding".into()]);
        assert_eq!(missing, vec!["funding"]);
    }
}
