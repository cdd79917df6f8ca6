//! Stage 3: match each candidate's data needs against the catalog and apply
//! the feasibility gate.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info, warn};

use super::StageContext;
use crate::candidate::{Candidate, JoinPair, MatchedResource, MatchingFacts};
use crate::errors::PipelineError;
use crate::gates::feasibility;
use crate::orchestrator::outputs::{MatchingOutput, StageOutcome};

pub async fn run(
    ctx: &StageContext<'_>,
    candidates: Vec<Candidate>,
) -> Result<StageOutcome<MatchingOutput>, PipelineError> {
    let section = &ctx.config.toml.matching;
    let threshold = ctx.config.toml.gates.feasibility_threshold;

    let mut passed = Vec::new();
    let mut rejected = Vec::new();
    let mut notes = Vec::new();

    for mut candidate in candidates {
        let mut best: HashMap<String, MatchedResource> = HashMap::new();
        let mut matched_needs = 0;
        for need in &candidate.data_needs {
            let query = need.query_text();
            if query.is_empty() {
                continue;
            }
            let hits = match ctx.collabs.search.search(&query, section.top_k).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(candidate = %candidate.id, query = %query, error = %e, "Similarity search failed");
                    notes.push(format!("Search failed for {} '{}': {}", candidate.id, query, e));
                    continue;
                }
            };
            if !hits.is_empty() {
                matched_needs += 1;
            }
            for hit in hits {
                let keep = best
                    .get(&hit.resource_id)
                    .is_none_or(|existing| hit.score > existing.score);
                if keep {
                    best.insert(
                        hit.resource_id.clone(),
                        MatchedResource {
                            resource_id: hit.resource_id,
                            name: hit.name,
                            score: hit.score,
                        },
                    );
                }
            }
        }

        let mut resources: Vec<MatchedResource> = best.into_values().collect();
        resources.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.resource_id.cmp(&b.resource_id))
        });

        let ids: Vec<String> = resources.iter().map(|r| r.resource_id.clone()).collect();
        let params = ctx
            .collabs
            .catalog
            .call(move |db| {
                ids.into_iter()
                    .map(|id| {
                        let names = db
                            .parameters(&id)?
                            .into_iter()
                            .map(|p| p.param_name)
                            .collect::<Vec<_>>();
                        Ok::<_, anyhow::Error>((id, names))
                    })
                    .collect::<anyhow::Result<Vec<_>>>()
            })
            .await
            .map_err(PipelineError::Catalog)?;

        let join_pairs = find_join_pairs(&params, &section.known_join_keys);
        let join_key_count = join_pairs.iter().map(|p| p.keys.len()).sum();

        let result = feasibility(
            candidate.data_needs.len(),
            matched_needs,
            resources.len(),
            join_key_count,
            threshold,
        );
        debug!(
            candidate = %candidate.id,
            score = result.score,
            resources = resources.len(),
            join_keys = join_key_count,
            "Feasibility computed"
        );

        let passes = result.passed;
        if passes {
            resources.truncate(section.keep_top);
        }
        candidate.matching = Some(MatchingFacts {
            resources,
            join_pairs,
            join_key_count,
            matched_needs,
            feasibility: result,
        });

        if passes {
            passed.push(candidate);
        } else {
            rejected.push(candidate);
        }
    }

    info!(
        passed = passed.len(),
        total = passed.len() + rejected.len(),
        "Feasibility gate applied"
    );

    Ok(StageOutcome::from_notes(
        MatchingOutput {
            passed,
            rejected,
            duration_sec: 0.0,
        },
        notes,
    ))
}

/// Keys two parameter lists can be joined on: known key names appearing as a
/// substring on both sides, plus parameter names present on both sides.
pub fn join_keys(left: &[String], right: &[String], known: &[String]) -> Vec<String> {
    let left: BTreeSet<&str> = left.iter().map(|p| p.trim()).filter(|p| !p.is_empty()).collect();
    let right: BTreeSet<&str> = right.iter().map(|p| p.trim()).filter(|p| !p.is_empty()).collect();

    let mut keys: BTreeSet<String> = left.intersection(&right).map(|k| k.to_string()).collect();
    for key in known {
        let on_left = left.iter().any(|name| name.contains(key.as_str()));
        let on_right = right.iter().any(|name| name.contains(key.as_str()));
        if on_left && on_right {
            keys.insert(key.clone());
        }
    }
    keys.into_iter().collect()
}

/// Every unordered pair of resources that shares at least one join key.
pub fn find_join_pairs(params: &[(String, Vec<String>)], known: &[String]) -> Vec<JoinPair> {
    let mut pairs = Vec::new();
    for (i, (left_id, left)) in params.iter().enumerate() {
        for (right_id, right) in &params[i + 1..] {
            let keys = join_keys(left, right, known);
            if !keys.is_empty() {
                pairs.push(JoinPair {
                    left: left_id.clone(),
                    right: right_id.clone(),
                    keys,
                });
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::candidate::DataRequirement;
    use crate::invoker::testing::FakeReasoning;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    struct NoHits;

    #[async_trait::async_trait]
    impl crate::search::SimilaritySearch for NoHits {
        async fn search(
            &self,
            _query: &str,
            _top_k: usize,
        ) -> anyhow::Result<Vec<crate::search::SearchHit>> {
            Ok(Vec::new())
        }
    }

    fn need(field: &str, description: &str) -> DataRequirement {
        DataRequirement {
            field_name: field.into(),
            description: description.into(),
            priority: "required".into(),
        }
    }

    // =========================================
    // Join analysis
    // =========================================

    #[test]
    fn test_join_keys_exact_and_known_substring() {
        let keys = join_keys(
            &strings(&["region_code", "pm10", "sido_name"]),
            &strings(&["region_code", "year", "sido_name_kr"]),
            &strings(&["sido_name", "adm_cd"]),
        );
        assert_eq!(keys, strings(&["region_code", "sido_name"]));
    }

    #[test]
    fn test_join_keys_none_shared() {
        assert!(join_keys(&strings(&["a"]), &strings(&["b"]), &strings(&["adm_cd"])).is_empty());
        assert!(join_keys(&strings(&[""]), &strings(&[" "]), &[]).is_empty());
    }

    #[test]
    fn test_find_join_pairs_counts_every_pair_once() {
        let params = vec![
            ("A".to_string(), strings(&["region_code", "date"])),
            ("B".to_string(), strings(&["region_code"])),
            ("C".to_string(), strings(&["date"])),
        ];
        let pairs = find_join_pairs(&params, &[]);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].left, "A");
        assert_eq!(pairs[0].right, "B");
        assert_eq!(pairs[1].keys, strings(&["date"]));
    }

    // =========================================
    // Stage
    // =========================================

    #[tokio::test]
    async fn test_matched_candidate_passes_and_records_facts() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let collabs = collaborators(Arc::new(FakeReasoning::default()));
        let ctx = context(&config, &collabs);

        let mut candidate = Candidate::new("H-001", "Commute Air Alerts");
        candidate.data_needs = vec![need("air quality", "air quality forecast by region")];

        let out = run(&ctx, vec![candidate]).await.unwrap().into_output();
        assert_eq!(out.passed.len(), 1);
        let facts = out.passed[0].matching.as_ref().unwrap();
        assert_eq!(facts.matched_needs, 1);
        assert!(facts.resources.len() <= config.toml.matching.keep_top);
        assert!(facts.resources.iter().any(|r| r.resource_id.starts_with("AIR")));
        assert!(facts.feasibility.passed);
        for pair in facts.resources.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_candidate_without_needs_is_rejected() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let collabs = collaborators(Arc::new(FakeReasoning::default()));
        let ctx = context(&config, &collabs);

        let out = run(&ctx, vec![Candidate::new("H-002", "Vague Idea")])
            .await
            .unwrap()
            .into_output();
        assert!(out.passed.is_empty());
        assert_eq!(out.rejected.len(), 1);
        let facts = out.rejected[0].matching.as_ref().unwrap();
        assert_eq!(facts.feasibility.score, 0.0);
    }

    #[tokio::test]
    async fn test_unmatched_needs_lower_feasibility() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let mut collabs = collaborators(Arc::new(FakeReasoning::default()));
        collabs.search = Arc::new(NoHits);
        let ctx = context(&config, &collabs);

        let mut candidate = Candidate::new("H-003", "Nothing Matches");
        candidate.data_needs = vec![need("ferry schedules", ""), need("tide tables", "")];

        let out = run(&ctx, vec![candidate]).await.unwrap().into_output();
        assert_eq!(out.rejected.len(), 1);
        let facts = out.rejected[0].matching.as_ref().unwrap();
        assert_eq!(facts.matched_needs, 0);
        assert!(facts.resources.is_empty());
    }
}
