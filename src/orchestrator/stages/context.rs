//! Stage 1: gather the signals that seed idea generation.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};

use super::StageContext;
use crate::errors::{PipelineError, truncate_chars};
use crate::invoker::Purpose;
use crate::orchestrator::RunInput;
use crate::orchestrator::outputs::{ContextMode, ContextOutput, StageOutcome};
use crate::orchestrator::prompts;
use crate::signals::{Signal, SourceRotation, UrlCache};

const MANUAL_TITLE_CHARS: usize = 200;
const CACHE_FALLBACK_LIMIT: usize = 10;
const CACHE_TITLE_CHARS: usize = 80;

pub const MANUAL_SOURCE: &str = "manual";
pub const ASSUMPTION_SOURCE: &str = "assumption";
pub const CACHE_SOURCE: &str = "cache_recent";

pub async fn run(
    ctx: &StageContext<'_>,
    input: &RunInput,
) -> Result<StageOutcome<ContextOutput>, PipelineError> {
    if let Some(text) = input.manual_signals.as_deref() {
        info!("Using manual signals");
        return Ok(StageOutcome::Complete(manual(text, ctx.now)));
    }
    if let Some(text) = input.assumptions.as_deref() {
        return from_assumptions(ctx, text).await;
    }
    Ok(collect(ctx).await)
}

fn output(mode: ContextMode, signals: Vec<Signal>) -> ContextOutput {
    ContextOutput {
        mode,
        signals,
        sources_run: Vec::new(),
        sources_failed: Vec::new(),
        from_cache: 0,
        duration_sec: 0.0,
    }
}

fn stamped(mut signal: Signal, now: DateTime<Utc>) -> Signal {
    signal.collected_at = now;
    signal
}

fn manual(text: &str, now: DateTime<Utc>) -> ContextOutput {
    let text = text.trim();
    let signal = Signal::new(MANUAL_SOURCE, truncate_chars(text, MANUAL_TITLE_CHARS)).with_snippet(text);
    output(ContextMode::Manual, vec![stamped(signal, now)])
}

/// Keywords from `[{"keyword", "context"}]`, or the same list under
/// `keywords`/`signals`. Bare strings are accepted as keywords.
fn parse_keywords(value: &Value, now: DateTime<Utc>) -> Vec<Signal> {
    let items: &[Value] = match value {
        Value::Array(items) => items,
        Value::Object(map) => map
            .get("keywords")
            .or_else(|| map.get("signals"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };
    items
        .iter()
        .filter_map(|item| {
            let keyword = item
                .get("keyword")
                .and_then(Value::as_str)
                .or_else(|| item.as_str())?
                .trim();
            if keyword.is_empty() {
                return None;
            }
            let context = item.get("context").and_then(Value::as_str).unwrap_or_default();
            Some(stamped(
                Signal::new(ASSUMPTION_SOURCE, keyword).with_snippet(context),
                now,
            ))
        })
        .collect()
}

async fn from_assumptions(
    ctx: &StageContext<'_>,
    text: &str,
) -> Result<StageOutcome<ContextOutput>, PipelineError> {
    let prompt = ctx
        .collabs
        .prompts
        .render(prompts::ASSUMPTIONS, &[("assumptions", text)])?;

    let mut notes = Vec::new();
    let signals = match ctx.collabs.reasoning.invoke(&prompt, Purpose::Assumptions).await {
        Ok(value) => parse_keywords(&value, ctx.now),
        Err(e) => {
            warn!(error = %e, "Assumption conversion failed, using raw text");
            notes.push(format!("Assumption conversion failed: {}", e));
            Vec::new()
        }
    };

    let signals = if signals.is_empty() {
        if notes.is_empty() {
            notes.push("Assumption conversion returned no keywords".to_string());
        }
        vec![stamped(
            Signal::new(ASSUMPTION_SOURCE, truncate_chars(text.trim(), MANUAL_TITLE_CHARS))
                .with_snippet(text.trim()),
            ctx.now,
        )]
    } else {
        signals
    };

    info!(keywords = signals.len(), "Converted assumptions to signals");
    Ok(StageOutcome::from_notes(
        output(ContextMode::Assumptions, signals),
        notes,
    ))
}

fn title_from_url(url: &str) -> String {
    let segment = url
        .trim_end_matches('/')
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or(url);
    truncate_chars(segment, CACHE_TITLE_CHARS)
}

fn cache_fallback(cache: &UrlCache, now: DateTime<Utc>) -> Vec<Signal> {
    cache
        .recent_urls(CACHE_FALLBACK_LIMIT)
        .into_iter()
        .map(|url| stamped(Signal::new(CACHE_SOURCE, title_from_url(&url)).with_url(url), now))
        .collect()
}

async fn collect(ctx: &StageContext<'_>) -> StageOutcome<ContextOutput> {
    let section = &ctx.config.toml.signals;
    let mut cache = UrlCache::load(&ctx.config.signal_cache_file(), section.cache_ttl_hours);
    cache.prune(ctx.now);
    let mut rotation =
        SourceRotation::new(section.pool.clone(), section.pick, cache.rotation_index());

    let report = ctx
        .collabs
        .collector
        .collect(&mut rotation, &mut cache, ctx.now)
        .await;

    let mut notes = Vec::new();
    if !report.sources_failed.is_empty() {
        notes.push(format!(
            "Signal sources failed: {}",
            report.sources_failed.join(", ")
        ));
    }

    let mut out = output(ContextMode::Collected, report.signals);
    out.sources_run = report.sources_run;
    out.sources_failed = report.sources_failed;

    if out.signals.is_empty() {
        out.signals = cache_fallback(&cache, ctx.now);
        out.from_cache = out.signals.len();
        warn!(
            from_cache = out.from_cache,
            "No new signals collected, falling back to recently cached URLs"
        );
    }

    if let Err(e) = cache.save() {
        warn!(error = %e, "Failed to save signal cache");
    }

    StageOutcome::from_notes(out, notes)
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::invoker::testing::FakeReasoning;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    // =========================================
    // Input modes
    // =========================================

    #[tokio::test]
    async fn test_manual_signals_become_one_signal() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let collabs = collaborators(Arc::new(FakeReasoning::default()));
        let ctx = context(&config, &collabs);
        let input = RunInput {
            manual_signals: Some("x".repeat(300)),
            assumptions: None,
        };

        let out = run(&ctx, &input).await.unwrap();
        assert!(!out.is_partial());
        let out = out.into_output();
        assert_eq!(out.mode, ContextMode::Manual);
        assert_eq!(out.signals.len(), 1);
        assert_eq!(out.signals[0].source, "manual");
        assert_eq!(out.signals[0].title.chars().count(), 200);
        assert_eq!(out.signals[0].snippet.len(), 300);
    }

    #[tokio::test]
    async fn test_assumptions_converted_to_keywords() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let reasoning = Arc::new(FakeReasoning::default().with(
            Purpose::Assumptions,
            json!({"keywords": [
                {"keyword": "elder care", "context": "aging population"},
                {"keyword": "  "},
                "EV charging"
            ]}),
        ));
        let collabs = collaborators(reasoning.clone());
        let ctx = context(&config, &collabs);
        let input = RunInput {
            manual_signals: None,
            assumptions: Some("people are getting older".into()),
        };

        let out = run(&ctx, &input).await.unwrap().into_output();
        let titles: Vec<_> = out.signals.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["elder care", "EV charging"]);
        assert_eq!(out.signals[0].snippet, "aging population");
        let prompts = reasoning.prompts.lock().unwrap();
        assert!(prompts[0].1.contains("people are getting older"));
    }

    #[tokio::test]
    async fn test_assumption_failure_falls_back_to_raw_text() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let collabs = collaborators(Arc::new(FakeReasoning::default()));
        let ctx = context(&config, &collabs);
        let input = RunInput {
            manual_signals: None,
            assumptions: Some("  remote work is here to stay ".into()),
        };

        let out = run(&ctx, &input).await.unwrap();
        assert!(out.is_partial());
        let out = out.into_output();
        assert_eq!(out.signals.len(), 1);
        assert_eq!(out.signals[0].title, "remote work is here to stay");
    }

    // =========================================
    // Collection
    // =========================================

    #[tokio::test]
    async fn test_collection_advances_rotation_and_persists_cache() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let collabs = collaborators(Arc::new(FakeReasoning::default()));
        let ctx = context(&config, &collabs);
        let input = RunInput::default();

        let out = run(&ctx, &input).await.unwrap().into_output();
        assert_eq!(out.mode, ContextMode::Collected);
        assert!(!out.signals.is_empty());
        assert_eq!(out.from_cache, 0);
        assert!(out.sources_failed.is_empty());

        let section = &config.toml.signals;
        let cache = UrlCache::load(&config.signal_cache_file(), section.cache_ttl_hours);
        assert_eq!(cache.len(), out.signals.len());
        assert_eq!(cache.rotation_index(), section.pick % section.pool.len());
    }

    #[tokio::test]
    async fn test_all_cached_falls_back_to_recent_urls() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let collabs = collaborators(Arc::new(FakeReasoning::default()));
        let ctx = context(&config, &collabs);

        // one pass per pool entry caches every source's URLs
        let pool_len = config.toml.signals.pool.len();
        let mut total = 0;
        for _ in 0..pool_len {
            total += run(&ctx, &RunInput::default()).await.unwrap().into_output().signals.len();
        }
        assert!(total > 0);

        let out = run(&ctx, &RunInput::default()).await.unwrap().into_output();
        assert!(out.from_cache > 0);
        assert!(out.from_cache <= 10);
        assert!(out.signals.iter().all(|s| s.source == CACHE_SOURCE));
        assert!(out.signals.iter().all(|s| s.url.is_some()));
    }

    #[test]
    fn test_title_from_url() {
        assert_eq!(title_from_url("https://example.invalid/news/42/"), "42");
        assert_eq!(title_from_url("plain"), "plain");
    }
}
