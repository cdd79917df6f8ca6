use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::time::Duration;

use super::Signal;
use crate::shell::run_shell_json;

#[async_trait]
pub trait SignalSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<Signal>>;
}

/// A source backed by a shell command printing a JSON array of signals.
pub struct CommandSource {
    name: String,
    command: String,
    timeout: Duration,
}

impl CommandSource {
    pub fn new(name: impl Into<String>, command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            timeout,
        }
    }
}

/// Accept a bare array or an object wrapping it under `signals`.
fn parse_signals(source: &str, value: Value) -> Result<Vec<Signal>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("signals") {
            Some(Value::Array(items)) => items,
            _ => anyhow::bail!("expected a JSON array of signals"),
        },
        _ => anyhow::bail!("expected a JSON array of signals"),
    };

    let now = Utc::now();
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<Signal>(item).ok())
        .filter(|s| !s.title.trim().is_empty())
        .map(|mut s| {
            s.source = source.to_string();
            s.collected_at = now;
            s
        })
        .collect())
}

#[async_trait]
impl SignalSource for CommandSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<Signal>> {
        let value = run_shell_json(&self.command, self.timeout)
            .await
            .with_context(|| format!("Signal source '{}' failed", self.name))?;
        parse_signals(&self.name, value)
            .with_context(|| format!("Signal source '{}' printed bad output", self.name))
    }
}

/// A fixed list of signals, used for offline runs.
pub struct StaticSource {
    name: String,
    signals: Vec<Signal>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, signals: Vec<Signal>) -> Self {
        Self {
            name: name.into(),
            signals,
        }
    }

    /// Two canned headlines tagged with the source name.
    pub fn sample(name: &str) -> Self {
        let signals = vec![
            Signal::new(name, format!("{}: public data demand rising", name))
                .with_url(format!("https://example.invalid/{}/1", name)),
            Signal::new(name, format!("{}: new open data release", name))
                .with_url(format!("https://example.invalid/{}/2", name)),
        ];
        Self::new(name, signals)
    }
}

#[async_trait]
impl SignalSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<Signal>> {
        Ok(self.signals.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_array_sets_source() {
        let signals = parse_signals(
            "news",
            json!([{"title": "A", "url": "https://a"}, {"title": "  "}, {"nope": 1}]),
        )
        .unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].source, "news");
    }

    #[test]
    fn test_parse_wrapped_object() {
        let signals = parse_signals("tech", json!({"signals": [{"title": "B"}]})).unwrap();
        assert_eq!(signals[0].title, "B");
    }

    #[test]
    fn test_parse_rejects_scalar() {
        assert!(parse_signals("x", json!(3)).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_source_fetch() {
        let source = CommandSource::new(
            "policy",
            r#"echo '[{"title": "Open data act", "snippet": "s"}]'"#,
            Duration::from_secs(5),
        );
        let signals = source.fetch().await.unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].source, "policy");
    }

    #[tokio::test]
    async fn test_static_sample() {
        let signals = StaticSource::sample("news").fetch().await.unwrap();
        assert_eq!(signals.len(), 2);
        assert!(signals.iter().all(|s| s.source == "news"));
    }
}
