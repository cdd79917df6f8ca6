//! Stage 2: turn signals into candidate hypotheses.

use anyhow::Context;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::StageContext;
use crate::candidate::Candidate;
use crate::catalog::DomainSummary;
use crate::errors::PipelineError;
use crate::invoker::Purpose;
use crate::orchestrator::outputs::{GenerationOutput, StageOutcome};
use crate::orchestrator::prompts;
use crate::publish::{FeedbackLog, FeedbackSummary, IdeaArchive};
use crate::signals::Signal;

const MAX_PROMPT_SIGNALS: usize = 30;
const RECENT_SERVICE_HOURS: i64 = 24;

pub async fn run(
    ctx: &StageContext<'_>,
    signals: &[Signal],
) -> Result<StageOutcome<GenerationOutput>, PipelineError> {
    let signal_view: Vec<Value> = signals
        .iter()
        .take(MAX_PROMPT_SIGNALS)
        .map(|s| json!({"source": s.source, "title": s.title, "snippet": s.snippet}))
        .collect();
    let signals_json =
        serde_json::to_string_pretty(&signal_view).context("Failed to serialize signals")?;

    let domains = ctx
        .collabs
        .catalog
        .call(|db| db.domain_summaries())
        .await
        .map_err(PipelineError::Catalog)?;

    let archive = IdeaArchive::new(ctx.config.archive_file());
    let recent = archive
        .service_names(RECENT_SERVICE_HOURS, ctx.now)
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read idea archive, no recent services excluded");
            Vec::new()
        });

    let feedback = FeedbackLog::new(ctx.config.feedback_file())
        .summary()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read feedback log");
            FeedbackSummary::default()
        });

    let domains = format_domains(&domains);
    let recent = format_list(&recent);
    let feedback = format_feedback(&feedback);
    let prompt = ctx.collabs.prompts.render(
        prompts::GENERATION,
        &[
            ("signals", signals_json.as_str()),
            ("domains", domains.as_str()),
            ("recent_services", recent.as_str()),
            ("feedback", feedback.as_str()),
        ],
    )?;

    // An exhausted invoker here leaves nothing to work on.
    let value = ctx
        .collabs
        .reasoning
        .invoke(&prompt, Purpose::Generation)
        .await?;

    let (candidates, mut notes) = parse_candidates(value);
    if candidates.is_empty() {
        notes.push("No hypotheses generated".to_string());
    }
    info!(
        candidates = candidates.len(),
        signals = signals.len(),
        "Generated hypotheses"
    );

    Ok(StageOutcome::from_notes(
        GenerationOutput {
            candidates,
            duration_sec: 0.0,
        },
        notes,
    ))
}

fn format_domains(domains: &[DomainSummary]) -> String {
    if domains.is_empty() {
        return "(none)".to_string();
    }
    domains
        .iter()
        .map(|d| format!("- {} ({} APIs): {}", d.category, d.count, d.sample_names.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_list(items: &[String]) -> String {
    if items.is_empty() {
        return "(none)".to_string();
    }
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_feedback(feedback: &FeedbackSummary) -> String {
    if feedback.is_empty() {
        return "(none)".to_string();
    }
    format!(
        "Avoid ideas similar to: {}\nMore ideas like: {}",
        feedback.blacklisted.join(", "),
        feedback.liked.join(", ")
    )
}

/// Hypotheses from a list or `{"hypotheses": [...]}`. Entries without an id
/// are numbered `H-001`, `H-002`, ... by position. Malformed entries are
/// dropped with a note.
pub fn parse_candidates(value: Value) -> (Vec<Candidate>, Vec<String>) {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("hypotheses") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    let mut candidates = Vec::new();
    let mut notes = Vec::new();
    for (i, mut item) in items.into_iter().enumerate() {
        if let Value::Object(map) = &mut item {
            let has_id = map
                .get("id")
                .and_then(Value::as_str)
                .is_some_and(|id| !id.trim().is_empty());
            if !has_id {
                map.insert("id".to_string(), Value::String(format!("H-{:03}", i + 1)));
            }
        }
        match serde_json::from_value::<Candidate>(item) {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => {
                warn!(index = i, error = %e, "Dropping malformed hypothesis");
                notes.push(format!("Hypothesis {} malformed: {}", i + 1, e));
            }
        }
    }
    (candidates, notes)
}
