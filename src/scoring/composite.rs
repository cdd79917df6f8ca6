use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::engine_config::WeightsSection;
use crate::util::round_to;

const SCORE_MIN: f64 = 0.0;
const SCORE_MAX: f64 = 5.0;
const MISSING_SCORE: f64 = 3.0;

/// Novelty, urgency, market, resource fit, validation; each on 0..=5.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    #[serde(rename = "N")]
    pub n: f64,
    #[serde(rename = "U")]
    pub u: f64,
    #[serde(rename = "M")]
    pub m: f64,
    #[serde(rename = "R")]
    pub r: f64,
    #[serde(rename = "V")]
    pub v: f64,
}

impl SubScores {
    /// Weighted composite, rounded to four decimals.
    pub fn weighted(&self, weights: &WeightsSection) -> f64 {
        round_to(
            self.n * weights.n
                + self.u * weights.u
                + self.m * weights.m
                + self.r * weights.r
                + self.v * weights.v,
            4,
        )
    }
}

/// N/U/M/R as returned by the batch scoring call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReasoningScores {
    pub n: f64,
    pub u: f64,
    pub m: f64,
    pub r: f64,
}

impl Default for ReasoningScores {
    fn default() -> Self {
        Self {
            n: MISSING_SCORE,
            u: MISSING_SCORE,
            m: MISSING_SCORE,
            r: MISSING_SCORE,
        }
    }
}

impl ReasoningScores {
    pub fn with_v(self, v: f64) -> SubScores {
        SubScores {
            n: self.n,
            u: self.u,
            m: self.m,
            r: self.r,
            v,
        }
    }
}

/// Map the scoring response (a list, or `{"scores": [...]}`) by candidate id.
///
/// Missing or non-numeric entries default to 3; values are clamped to 0..=5.
pub fn parse_reasoning_scores(value: &Value) -> HashMap<String, ReasoningScores> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("scores") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        },
        _ => &[],
    };

    let read = |item: &Value, key: &str| {
        item.get(key)
            .and_then(Value::as_f64)
            .map(|v| v.clamp(SCORE_MIN, SCORE_MAX))
            .unwrap_or(MISSING_SCORE)
    };

    items
        .iter()
        .filter_map(|item| {
            let id = item.get("id")?.as_str()?.to_string();
            Some((
                id,
                ReasoningScores {
                    n: read(item, "N"),
                    u: read(item, "U"),
                    m: read(item, "M"),
                    r: read(item, "R"),
                },
            ))
        })
        .collect()
}

/// The V sub-score: a neutral default when validation was skipped, else the
/// validation score scaled from 0..=100 down to 0..=5.
pub fn validation_component(validation_score: Option<f64>, skipped_v: f64) -> f64 {
    match validation_score {
        Some(score) => round_to((score / 20.0).clamp(SCORE_MIN, SCORE_MAX), 4),
        None => skipped_v,
    }
}

fn heuristic_clamp(value: f64) -> f64 {
    round_to(value.clamp(1.0, SCORE_MAX), 1)
}

/// Deterministic sub-scores used when the scoring call fails.
pub fn heuristic_scores(
    competitors_count: usize,
    validation_score: Option<f64>,
    feasibility_score: f64,
    v: f64,
) -> SubScores {
    let comp = competitors_count as f64;
    let validation = validation_score.unwrap_or(v * 20.0);
    SubScores {
        n: heuristic_clamp(5.0 - 0.5 * comp),
        u: heuristic_clamp(validation / 20.0),
        m: heuristic_clamp(1.0 + 0.6 * comp),
        r: heuristic_clamp(feasibility_score / 20.0),
        v,
    }
}
