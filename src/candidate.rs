//! The idea record that flows through stages 2 to 6.
//!
//! Each stage owns one optional facts block. A block is filled in once its
//! stage has run and is never cleared afterwards.

use serde::{Deserialize, Serialize};

use crate::budget::Depth;
use crate::competitors::Competitor;
use crate::gates::{FeasibilityResult, MarketProxyResult, ValidationRatios, ValidationResult};
use crate::scoring::{Grade, SubScores};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRequirement {
    pub field_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: String,
}

fn default_priority() -> String {
    "required".to_string()
}

impl DataRequirement {
    /// Text used to query the similarity index.
    pub fn query_text(&self) -> String {
        format!("{} {}", self.field_name, self.description)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedResource {
    pub resource_id: String,
    pub name: String,
    pub score: f64,
}

/// Two matched resources sharing joinable parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinPair {
    pub left: String,
    pub right: String,
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingFacts {
    pub resources: Vec<MatchedResource>,
    pub join_pairs: Vec<JoinPair>,
    pub join_key_count: usize,
    pub matched_needs: usize,
    pub feasibility: FeasibilityResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFacts {
    pub depth: Depth,
    /// Absent when validation was skipped for time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ValidationResult>,
    pub passed: bool,
    pub ratios: ValidationRatios,
    pub competitors_count: usize,
    #[serde(default)]
    pub competitors: Vec<Competitor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_proxy: Option<MarketProxyResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    Reasoning,
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringFacts {
    pub scores: SubScores,
    pub weighted_score: f64,
    pub source: ScoreSource,
    pub max_similarity: f64,
    pub is_duplicate: bool,
    /// Assigned only to candidates that survive deduplication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<Grade>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub problem: String,
    #[serde(default)]
    pub solution: String,
    #[serde(default)]
    pub target_buyer: String,
    #[serde(default)]
    pub revenue_model: String,
    #[serde(default)]
    pub opportunity_area: String,
    #[serde(default)]
    pub data_needs: Vec<DataRequirement>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matching: Option<MatchingFacts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationFacts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring: Option<ScoringFacts>,
}

impl Candidate {
    pub fn new(id: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            service_name: service_name.into(),
            problem: String::new(),
            solution: String::new(),
            target_buyer: String::new(),
            revenue_model: String::new(),
            opportunity_area: String::new(),
            data_needs: Vec::new(),
            matching: None,
            validation: None,
            scoring: None,
        }
    }

    pub fn feasibility_score(&self) -> f64 {
        self.matching
            .as_ref()
            .map(|m| m.feasibility.score)
            .unwrap_or(0.0)
    }

    pub fn validation_score(&self) -> Option<f64> {
        self.validation
            .as_ref()
            .and_then(|v| v.result.as_ref())
            .map(|r| r.score)
    }

    pub fn competitors_count(&self) -> usize {
        self.validation
            .as_ref()
            .map(|v| v.competitors_count)
            .unwrap_or(0)
    }

    pub fn weighted_score(&self) -> f64 {
        self.scoring
            .as_ref()
            .map(|s| s.weighted_score)
            .unwrap_or(0.0)
    }

    pub fn grade(&self) -> Option<Grade> {
        self.scoring.as_ref().and_then(|s| s.grade)
    }

    /// Text embedded for duplicate detection.
    pub fn embedding_text(&self) -> String {
        [
            self.service_name.as_str(),
            self.problem.as_str(),
            self.solution.as_str(),
        ]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
    }
}
