//! Similarity search over catalog resources.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::catalog::CatalogResource;
use crate::embedding::{Embedder, cosine_similarity};
use crate::util::round_to;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub resource_id: String,
    pub name: String,
    pub score: f64,
    /// 1-based position in the result list.
    pub rank: usize,
}

#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> anyhow::Result<Vec<SearchHit>>;
}

struct IndexEntry {
    resource_id: String,
    name: String,
    vector: Vec<f32>,
}

/// In-memory cosine index built once per run from the active catalog.
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn build(embedder: Arc<dyn Embedder>, resources: &[CatalogResource]) -> Self {
        let entries = resources
            .iter()
            .map(|r| IndexEntry {
                resource_id: r.api_id.clone(),
                name: r.name.clone(),
                vector: embedder.embed(&r.search_text()),
            })
            .collect();
        Self { embedder, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn rank(&self, query: &str, top_k: usize) -> Vec<SearchHit> {
        let query_vector = self.embedder.embed(query);
        let mut scored: Vec<(&IndexEntry, f64)> = self
            .entries
            .iter()
            .map(|e| (e, cosine_similarity(&query_vector, &e.vector)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(top_k)
            .enumerate()
            .map(|(i, (entry, score))| SearchHit {
                resource_id: entry.resource_id.clone(),
                name: entry.name.clone(),
                score: round_to(score, 4),
                rank: i + 1,
            })
            .collect()
    }
}

#[async_trait]
impl SimilaritySearch for VectorIndex {
    async fn search(&self, query: &str, top_k: usize) -> anyhow::Result<Vec<SearchHit>> {
        Ok(self.rank(query, top_k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::sample_catalog;
    use crate::embedding::HashingEmbedder;

    fn index() -> VectorIndex {
        let resources = sample_catalog().list_active_resources().unwrap();
        VectorIndex::build(Arc::new(HashingEmbedder::default()), &resources)
    }

    #[tokio::test]
    async fn test_best_match_ranks_first() {
        let hits = index().search("hospital location", 5).await.unwrap();
        assert_eq!(hits[0].resource_id, "HSP-01");
        assert_eq!(hits[0].rank, 1);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_top_k_limits_results() {
        let hits = index().search("air quality data", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_score_hits_dropped() {
        let hits = index().search("zzzqqq", 10).await.unwrap();
        assert!(hits.iter().all(|h| h.score > 0.0));
    }

    #[test]
    fn test_index_excludes_inactive() {
        assert_eq!(index().len(), 6);
    }
}
