use serde::{Deserialize, Serialize};

use crate::util::round_to;

const MATCH_WEIGHT: f64 = 60.0;
const RESOURCE_WEIGHT: f64 = 20.0;
const JOIN_WEIGHT: f64 = 20.0;
const RESOURCE_SATURATION: f64 = 3.0;
const JOIN_SATURATION: f64 = 2.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityBreakdown {
    /// Matched requirements over total requirements, 0..=1.
    pub match_rate: f64,
    pub resource_score: f64,
    pub join_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityResult {
    /// 0..=100, one decimal.
    pub score: f64,
    pub passed: bool,
    pub breakdown: FeasibilityBreakdown,
    /// Pass line on the 0..=100 scale.
    pub threshold: f64,
}

/// Score how well a candidate's data requirements are covered by the catalog.
///
/// `threshold` is a fraction (0.40 means 40 points). A candidate with no
/// requirements scores 0 and fails.
pub fn feasibility(
    total_requirements: usize,
    matched_requirements: usize,
    matched_resource_count: usize,
    join_key_count: usize,
    threshold: f64,
) -> FeasibilityResult {
    // 0.4 * 100.0 is 40.00000000000001 in f64
    let threshold = round_to(threshold * 100.0, 4);

    if total_requirements == 0 {
        return FeasibilityResult {
            score: 0.0,
            passed: false,
            breakdown: FeasibilityBreakdown::default(),
            threshold,
        };
    }

    let match_rate = (matched_requirements.min(total_requirements) as f64) / total_requirements as f64;
    let resource_score =
        (matched_resource_count as f64 / RESOURCE_SATURATION).min(1.0) * RESOURCE_WEIGHT;
    let join_score = (join_key_count as f64 / JOIN_SATURATION).min(1.0) * JOIN_WEIGHT;

    let score = round_to(match_rate * MATCH_WEIGHT + resource_score + join_score, 1);

    FeasibilityResult {
        score,
        passed: score >= threshold,
        breakdown: FeasibilityBreakdown {
            match_rate: round_to(match_rate, 4),
            resource_score: round_to(resource_score, 1),
            join_score: round_to(join_score, 1),
        },
        threshold,
    }
}
