//! Stage 5: composite scoring, duplicate removal, grading.

use anyhow::Context;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::StageContext;
use crate::candidate::{Candidate, ScoreSource, ScoringFacts};
use crate::errors::PipelineError;
use crate::invoker::Purpose;
use crate::orchestrator::outputs::{ScoringOutput, StageOutcome};
use crate::orchestrator::prompts;
use crate::publish::IdeaArchive;
use crate::scoring::{
    Deduplicator, Grader, heuristic_scores, parse_reasoning_scores, validation_component,
};

pub async fn run(
    ctx: &StageContext<'_>,
    candidates: Vec<Candidate>,
) -> Result<StageOutcome<ScoringOutput>, PipelineError> {
    let toml = &ctx.config.toml;
    let mut notes = Vec::new();

    if candidates.is_empty() {
        info!("No candidates to score");
        return Ok(StageOutcome::Complete(ScoringOutput {
            source: ScoreSource::Reasoning,
            graded: Vec::new(),
            duplicates: Vec::new(),
            duration_sec: 0.0,
        }));
    }

    let summary: Vec<Value> = candidates
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "service_name": c.service_name,
                "problem": c.problem,
                "solution": c.solution,
                "target_buyer": c.target_buyer,
                "feasibility": c.feasibility_score(),
                "validation_score": c.validation_score(),
            })
        })
        .collect();
    let ideas = serde_json::to_string_pretty(&summary).context("Failed to serialize ideas")?;
    let prompt = ctx
        .collabs
        .prompts
        .render(prompts::SCORING, &[("ideas", ideas.as_str())])?;

    let reasoning = match ctx.collabs.reasoning.invoke(&prompt, Purpose::Scoring).await {
        Ok(value) => Some(parse_reasoning_scores(&value)),
        Err(e) => {
            warn!(error = %e, "Scoring call failed, using heuristic scores");
            notes.push(format!("Scoring call failed, heuristic scores used: {}", e));
            None
        }
    };
    let source = if reasoning.is_some() {
        ScoreSource::Reasoning
    } else {
        ScoreSource::Heuristic
    };

    let skipped_v = toml.validation.skipped_v;
    let mut scored: Vec<Candidate> = candidates
        .into_iter()
        .map(|mut c| {
            let v = validation_component(c.validation_score(), skipped_v);
            let scores = match &reasoning {
                Some(by_id) => by_id.get(&c.id).copied().unwrap_or_default().with_v(v),
                None => heuristic_scores(
                    c.competitors_count(),
                    c.validation_score(),
                    c.feasibility_score(),
                    v,
                ),
            };
            c.scoring = Some(ScoringFacts {
                weighted_score: scores.weighted(&toml.weights),
                scores,
                source,
                max_similarity: 0.0,
                is_duplicate: false,
                grade: None,
            });
            c
        })
        .collect();

    let historical = IdeaArchive::new(ctx.config.archive_file())
        .historical_texts()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read idea archive, skipping duplicate check");
            notes.push("Archive unreadable, duplicate check skipped".to_string());
            Vec::new()
        });
    let embedder = &ctx.collabs.embedder;
    let historical: Vec<Vec<f32>> = historical.iter().map(|t| embedder.embed(t)).collect();
    let vectors: Vec<Option<Vec<f32>>> = scored
        .iter()
        .map(|c| {
            let text = c.embedding_text();
            (!text.is_empty()).then(|| embedder.embed(&text))
        })
        .collect();
    let flags = Deduplicator::new(toml.gates.dedup_threshold).check(&vectors, &historical);

    let mut unique = Vec::new();
    let mut duplicates = Vec::new();
    for (mut c, flag) in scored.drain(..).zip(flags) {
        if let Some(facts) = c.scoring.as_mut() {
            facts.max_similarity = flag.max_similarity;
            facts.is_duplicate = flag.is_duplicate;
        }
        if flag.is_duplicate {
            duplicates.push(c);
        } else {
            unique.push(c);
        }
    }

    let composite: Vec<f64> = unique.iter().map(Candidate::weighted_score).collect();
    let grades = Grader::new(toml.grading.clone()).classify(&composite);
    for (c, grade) in unique.iter_mut().zip(grades) {
        if let Some(facts) = c.scoring.as_mut() {
            facts.grade = Some(grade);
        }
    }
    unique.sort_by(|a, b| {
        b.weighted_score()
            .partial_cmp(&a.weighted_score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    info!(
        graded = unique.len(),
        duplicates = duplicates.len(),
        source = ?source,
        "Scoring complete"
    );

    Ok(StageOutcome::from_notes(
        ScoringOutput {
            source,
            graded: unique,
            duplicates,
            duration_sec: 0.0,
        },
        notes,
    ))
}
