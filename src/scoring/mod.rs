//! Stage-5 scoring: composite sub-scores, duplicate detection, and grading.

pub mod composite;
pub mod dedup;
pub mod grade;

pub use composite::{
    ReasoningScores, SubScores, heuristic_scores, parse_reasoning_scores, validation_component,
};
pub use dedup::{DedupFlag, Deduplicator};
pub use grade::{Grade, Grader};
