//! Stage 4: market validation at the depth the remaining budget allows.

use std::collections::HashMap;

use anyhow::Context;
use futures::future::join_all;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::StageContext;
use crate::budget::Depth;
use crate::candidate::{Candidate, ValidationFacts};
use crate::errors::{PipelineError, truncate_chars};
use crate::gates::{
    ValidationRatios, community_size_for, market_proxy, trend_from_competitors, validation,
};
use crate::invoker::Purpose;
use crate::orchestrator::outputs::{StageOutcome, ValidationOutput};
use crate::orchestrator::prompts;

const BATCH_PROBLEM_CHARS: usize = 80;

pub async fn run(
    ctx: &StageContext<'_>,
    candidates: Vec<Candidate>,
    depth: Depth,
) -> Result<StageOutcome<ValidationOutput>, PipelineError> {
    info!(depth = ?depth, candidates = candidates.len(), "Validating candidates");

    if depth == Depth::Skipped {
        warn!("Validation skipped for time, neutral V assigned downstream");
        let passed = candidates
            .into_iter()
            .map(|mut c| {
                c.validation = Some(ValidationFacts {
                    depth,
                    result: None,
                    passed: true,
                    ratios: ValidationRatios::NEUTRAL,
                    competitors_count: 0,
                    competitors: Vec::new(),
                    market_proxy: None,
                });
                c
            })
            .collect();
        return Ok(StageOutcome::from_notes(
            ValidationOutput {
                depth,
                passed,
                rejected: Vec::new(),
                reasoning_failures: 0,
                duration_sec: 0.0,
            },
            vec!["Validation skipped: not enough time left".to_string()],
        ));
    }

    let mut notes = Vec::new();
    let (ratios, reasoning_failures) = match depth {
        Depth::Deep | Depth::Standard => per_candidate_ratios(ctx, &candidates).await?,
        Depth::Light => batch_ratios(ctx, &candidates).await?,
        Depth::Simplified | Depth::Skipped => {
            (vec![ValidationRatios::NEUTRAL; candidates.len()], 0)
        }
    };
    if reasoning_failures > 0 {
        notes.push(format!(
            "{} validation call(s) failed, neutral ratios used",
            reasoning_failures
        ));
    }

    let searches = candidates.iter().map(|c| async move {
        match ctx.collabs.competitors.search(&c.service_name).await {
            Ok(found) => Ok(found),
            Err(e) => {
                warn!(candidate = %c.id, error = %e, "Competitor search failed");
                Err(c.id.clone())
            }
        }
    });
    let mut competitor_lists = Vec::with_capacity(candidates.len());
    for result in join_all(searches).await {
        match result {
            Ok(found) => competitor_lists.push(found),
            Err(id) => {
                notes.push(format!("Competitor search failed for {}", id));
                competitor_lists.push(Vec::new());
            }
        }
    }

    let section = &ctx.config.toml.validation;
    let threshold = ctx.config.toml.gates.validation_threshold;
    let mut passed = Vec::new();
    let mut rejected = Vec::new();
    for ((mut candidate, ratios), competitors) in candidates.into_iter().zip(ratios).zip(competitor_lists) {
        let count = competitors.len();
        let community = community_size_for(
            &candidate.target_buyer,
            &section.large_community_keywords,
            &section.small_community_keywords,
        );
        let proxy = market_proxy(count, community, trend_from_competitors(count));
        let result = validation(ratios, count, proxy.score, threshold);
        let ok = result.passed;
        candidate.validation = Some(ValidationFacts {
            depth,
            result: Some(result),
            passed: ok,
            ratios,
            competitors_count: count,
            competitors,
            market_proxy: Some(proxy),
        });
        if ok {
            passed.push(candidate);
        } else {
            rejected.push(candidate);
        }
    }

    info!(
        passed = passed.len(),
        total = passed.len() + rejected.len(),
        reasoning_failures,
        "Validation gate applied"
    );

    Ok(StageOutcome::from_notes(
        ValidationOutput {
            depth,
            passed,
            rejected,
            reasoning_failures,
            duration_sec: 0.0,
        },
        notes,
    ))
}

fn describe(c: &Candidate) -> String {
    format!(
        "- Service: {}\n- Problem: {}\n- Solution: {}\n- Target: {}\n- Revenue model: {}",
        c.service_name, c.problem, c.solution, c.target_buyer, c.revenue_model
    )
}

/// Ratios from a reasoning response. Missing or non-numeric values are neutral.
pub fn parse_ratios(value: &Value) -> ValidationRatios {
    let read = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_f64)
            .unwrap_or(ValidationRatios::NEUTRAL.timing_fit)
    };
    ValidationRatios {
        timing_fit: read("timing_fit"),
        revenue_reference: read("revenue_reference"),
        mvp_difficulty: read("mvp_difficulty"),
    }
}

/// One reasoning call per candidate, issued concurrently. A failed call
/// leaves that candidate with neutral ratios.
async fn per_candidate_ratios(
    ctx: &StageContext<'_>,
    candidates: &[Candidate],
) -> Result<(Vec<ValidationRatios>, usize), PipelineError> {
    let rendered = candidates
        .iter()
        .map(|c| {
            let idea = describe(c);
            ctx.collabs
                .prompts
                .render(prompts::VALIDATION, &[("idea", idea.as_str())])
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let calls = rendered.iter().zip(candidates).map(|(prompt, c)| async move {
        match ctx.collabs.reasoning.invoke(prompt, Purpose::Validation).await {
            Ok(value) => Some(parse_ratios(&value)),
            Err(e) => {
                warn!(candidate = %c.id, error = %e, "Validation call failed, using neutral ratios");
                None
            }
        }
    });
    let results = join_all(calls).await;
    let failures = results.iter().filter(|r| r.is_none()).count();
    let ratios = results
        .into_iter()
        .map(|r| r.unwrap_or(ValidationRatios::NEUTRAL))
        .collect();
    Ok((ratios, failures))
}

/// One reasoning call for the whole batch, mapped back by id.
async fn batch_ratios(
    ctx: &StageContext<'_>,
    candidates: &[Candidate],
) -> Result<(Vec<ValidationRatios>, usize), PipelineError> {
    let items: Vec<Value> = candidates
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "service_name": c.service_name,
                "problem": truncate_chars(&c.problem, BATCH_PROBLEM_CHARS),
                "target": c.target_buyer,
                "revenue": c.revenue_model,
            })
        })
        .collect();
    let ideas = serde_json::to_string_pretty(&items).context("Failed to serialize batch")?;
    let prompt = ctx
        .collabs
        .prompts
        .render(prompts::BATCH_VALIDATION, &[("ideas", ideas.as_str())])?;

    let by_id = match ctx.collabs.reasoning.invoke(&prompt, Purpose::BatchValidation).await {
        Ok(value) => ratios_by_id(&value),
        Err(e) => {
            warn!(error = %e, "Batch validation failed, using neutral ratios");
            return Ok((vec![ValidationRatios::NEUTRAL; candidates.len()], 1));
        }
    };
    info!(mapped = by_id.len(), "Batch validation done");

    let ratios = candidates
        .iter()
        .map(|c| {
            by_id
                .get(&c.id)
                .copied()
                .unwrap_or(ValidationRatios::NEUTRAL)
        })
        .collect();
    Ok((ratios, 0))
}

fn ratios_by_id(value: &Value) -> HashMap<String, ValidationRatios> {
    let items: &[Value] = match value {
        Value::Array(items) => items,
        Value::Object(map) => map
            .get("validations")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };
    items
        .iter()
        .filter_map(|item| {
            let id = item.get("id")?.as_str()?;
            Some((id.to_string(), parse_ratios(item)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::competitors::{Competitor, CompetitorSearch};
    use crate::invoker::testing::FakeReasoning;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::tempdir;

    struct FlakyCompetitors;

    #[async_trait]
    impl CompetitorSearch for FlakyCompetitors {
        async fn search(&self, query: &str) -> anyhow::Result<Vec<Competitor>> {
            if query == "Broken" {
                anyhow::bail!("search backend down");
            }
            Ok((0..2)
                .map(|i| Competitor {
                    name: format!("{} rival {}", query, i),
                    url: None,
                    snippet: String::new(),
                })
                .collect())
        }
    }

    fn candidates() -> Vec<Candidate> {
        vec![Candidate::new("H-001", "Clinic Finder"), Candidate::new("H-002", "Air Alerts")]
    }

    fn strong() -> Value {
        json!({"timing_fit": 0.9, "revenue_reference": 0.9, "mvp_difficulty": 0.9})
    }

    // =========================================
    // Depth handling
    // =========================================

    #[tokio::test]
    async fn test_skipped_passes_everything_without_calls() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let reasoning = Arc::new(FakeReasoning::default());
        let collabs = collaborators(reasoning.clone());
        let ctx = context(&config, &collabs);

        let out = run(&ctx, candidates(), Depth::Skipped).await.unwrap();
        assert!(out.is_partial());
        let out = out.into_output();
        assert_eq!(out.passed.len(), 2);
        assert!(out.passed.iter().all(|c| c.validation_score().is_none()));
        assert!(reasoning.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deep_calls_once_per_candidate() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let reasoning = Arc::new(FakeReasoning::default().with(Purpose::Validation, strong()));
        let collabs = collaborators(reasoning.clone());
        let ctx = context(&config, &collabs);

        let out = run(&ctx, candidates(), Depth::Deep).await.unwrap();
        assert!(!out.is_partial());
        let out = out.into_output();
        assert_eq!(reasoning.calls_for(Purpose::Validation), 2);
        // 10 competitors + 6.2 proxy + 18 + 13.5 + 13.5
        assert_eq!(out.passed.len(), 2);
        assert_eq!(out.passed[0].validation_score(), Some(61.2));
    }

    #[tokio::test]
    async fn test_failed_calls_fall_back_to_neutral() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let collabs = collaborators(Arc::new(FakeReasoning::default()));
        let ctx = context(&config, &collabs);

        let out = run(&ctx, candidates(), Depth::Standard).await.unwrap();
        assert!(out.is_partial());
        let out = out.into_output();
        assert_eq!(out.reasoning_failures, 2);
        // 10 + 6.2 + 10 + 7.5 + 7.5 = 41.2 is below the line
        assert!(out.passed.is_empty());
        assert_eq!(out.rejected.len(), 2);
        let facts = out.rejected[0].validation.as_ref().unwrap();
        assert_eq!(facts.ratios, ValidationRatios::NEUTRAL);
        assert_eq!(facts.result.as_ref().unwrap().score, 41.2);
    }

    #[tokio::test]
    async fn test_light_maps_batch_response_by_id() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let reasoning = Arc::new(FakeReasoning::default().with(
            Purpose::BatchValidation,
            json!({"validations": [
                {"id": "H-002", "timing_fit": 0.9, "revenue_reference": 0.9, "mvp_difficulty": 0.9}
            ]}),
        ));
        let collabs = collaborators(reasoning.clone());
        let ctx = context(&config, &collabs);

        let out = run(&ctx, candidates(), Depth::Light).await.unwrap().into_output();
        assert_eq!(reasoning.calls_for(Purpose::BatchValidation), 1);
        assert_eq!(reasoning.calls_for(Purpose::Validation), 0);
        let ids: Vec<_> = out.passed.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["H-002"]);
        assert_eq!(out.rejected[0].id, "H-001");
    }

    #[tokio::test]
    async fn test_simplified_makes_no_reasoning_calls() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let reasoning = Arc::new(FakeReasoning::default().with(Purpose::Validation, strong()));
        let collabs = collaborators(reasoning.clone());
        let ctx = context(&config, &collabs);

        let out = run(&ctx, candidates(), Depth::Simplified).await.unwrap().into_output();
        assert!(reasoning.prompts.lock().unwrap().is_empty());
        assert_eq!(out.depth, Depth::Simplified);
        assert_eq!(out.rejected.len(), 2);
    }

    // =========================================
    // Competitors
    // =========================================

    #[tokio::test]
    async fn test_competitor_failure_contributes_nothing() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let mut collabs =
            collaborators(Arc::new(FakeReasoning::default().with(Purpose::Validation, strong())));
        collabs.competitors = Arc::new(FlakyCompetitors);
        let ctx = context(&config, &collabs);

        let input = vec![Candidate::new("H-001", "Broken"), Candidate::new("H-002", "Works")];
        let out = run(&ctx, input, Depth::Deep).await.unwrap();
        assert!(out.is_partial());
        let out = out.into_output();
        let all: Vec<&Candidate> = out.passed.iter().chain(out.rejected.iter()).collect();
        let broken = all.iter().find(|c| c.id == "H-001").unwrap();
        let works = all.iter().find(|c| c.id == "H-002").unwrap();
        assert_eq!(broken.competitors_count(), 0);
        assert_eq!(works.competitors_count(), 2);
        let facts = works.validation.as_ref().unwrap();
        assert_eq!(facts.result.as_ref().unwrap().breakdown.competitor_analysis, 25.0);
    }

    #[test]
    fn test_parse_ratios_defaults_missing_fields() {
        let ratios = parse_ratios(&json!({"timing_fit": 0.8, "mvp_difficulty": "hard"}));
        assert_eq!(ratios.timing_fit, 0.8);
        assert_eq!(ratios.revenue_reference, 0.5);
        assert_eq!(ratios.mvp_difficulty, 0.5);
    }
}
