use serde::{Deserialize, Serialize};

use super::market::PROXY_MAX;
use crate::util::round_to;

const COMPETITOR_MAX: f64 = 25.0;
const TIMING_MAX: f64 = 20.0;
const REVENUE_MAX: f64 = 15.0;
const MVP_MAX: f64 = 15.0;

/// Reasoning-derived ratios, each expected in 0..=1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationRatios {
    pub timing_fit: f64,
    pub revenue_reference: f64,
    pub mvp_difficulty: f64,
}

impl ValidationRatios {
    /// Neutral ratios used when the reasoning call is skipped or fails.
    pub const NEUTRAL: ValidationRatios = ValidationRatios {
        timing_fit: 0.5,
        revenue_reference: 0.5,
        mvp_difficulty: 0.5,
    };
}

impl Default for ValidationRatios {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationBreakdown {
    pub competitor_analysis: f64,
    pub market_demand_proxy: f64,
    pub timing_fit: f64,
    pub revenue_reference: f64,
    pub mvp_difficulty: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// 0..=100, one decimal.
    pub score: f64,
    pub passed: bool,
    pub breakdown: ValidationBreakdown,
    pub threshold: f64,
}

/// Too few competitors reads as an unproven market, too many as a saturated one.
pub fn competitor_step_score(competitor_count: usize) -> f64 {
    match competitor_count {
        0 => 10.0,
        1..=3 => 25.0,
        4..=7 => 20.0,
        8..=15 => 12.0,
        _ => 5.0,
    }
}

pub fn validation(
    ratios: ValidationRatios,
    competitor_count: usize,
    proxy_score: f64,
    threshold: f64,
) -> ValidationResult {
    let scaled = |ratio: f64, max: f64| round_to(ratio.clamp(0.0, 1.0) * max, 1);

    let breakdown = ValidationBreakdown {
        competitor_analysis: competitor_step_score(competitor_count),
        market_demand_proxy: round_to(proxy_score.clamp(0.0, PROXY_MAX), 1),
        timing_fit: scaled(ratios.timing_fit, TIMING_MAX),
        revenue_reference: scaled(ratios.revenue_reference, REVENUE_MAX),
        mvp_difficulty: scaled(ratios.mvp_difficulty, MVP_MAX),
    };
    debug_assert!(breakdown.competitor_analysis <= COMPETITOR_MAX);

    let score = round_to(
        breakdown.competitor_analysis
            + breakdown.market_demand_proxy
            + breakdown.timing_fit
            + breakdown.revenue_reference
            + breakdown.mvp_difficulty,
        1,
    );

    ValidationResult {
        score,
        passed: score >= threshold,
        breakdown,
        threshold,
    }
}
