use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedding::cosine_similarity;
use crate::util::round_to;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DedupFlag {
    /// Highest cosine similarity against the historical corpus, four decimals.
    pub max_similarity: f64,
    pub is_duplicate: bool,
}

/// Flags candidates whose embedding is too close to a historical one.
#[derive(Debug, Clone, Copy)]
pub struct Deduplicator {
    threshold: f64,
}

impl Deduplicator {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// One flag per input, in order. Inputs without a vector, or an empty
    /// history, are never duplicates.
    ///
    /// The comparison uses the rounded similarity and is inclusive.
    pub fn check(&self, vectors: &[Option<Vec<f32>>], historical: &[Vec<f32>]) -> Vec<DedupFlag> {
        vectors
            .iter()
            .map(|vector| match vector {
                Some(v) if !historical.is_empty() => {
                    let max = historical
                        .iter()
                        .map(|h| cosine_similarity(v, h))
                        .fold(0.0f64, f64::max);
                    let max_similarity = round_to(max, 4);
                    DedupFlag {
                        max_similarity,
                        is_duplicate: max_similarity >= self.threshold,
                    }
                }
                _ => DedupFlag::default(),
            })
            .inspect(|flag| {
                if flag.is_duplicate {
                    debug!(max_similarity = flag.max_similarity, "duplicate candidate");
                }
            })
            .collect()
    }
}
