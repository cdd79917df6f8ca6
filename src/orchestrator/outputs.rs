//! Typed per-stage outputs.
//!
//! Each stage produces one record. [`StageOutputs`] holds them as options that
//! are filled in as stages complete, so a failed run still carries everything
//! that finished before the failure.

use serde::{Deserialize, Serialize};

use crate::budget::Depth;
use crate::candidate::{Candidate, ScoreSource};
use crate::signals::Signal;

/// A stage either finished cleanly or finished with degraded results.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Complete(T),
    Partial { output: T, notes: Vec<String> },
}

impl<T> StageOutcome<T> {
    /// `Complete` when there are no notes, else `Partial`.
    pub fn from_notes(output: T, notes: Vec<String>) -> Self {
        if notes.is_empty() {
            StageOutcome::Complete(output)
        } else {
            StageOutcome::Partial { output, notes }
        }
    }

    pub fn notes(&self) -> &[String] {
        match self {
            StageOutcome::Complete(_) => &[],
            StageOutcome::Partial { notes, .. } => notes,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, StageOutcome::Partial { .. })
    }

    pub fn into_output(self) -> T {
        match self {
            StageOutcome::Complete(output) => output,
            StageOutcome::Partial { output, .. } => output,
        }
    }
}

/// Every stage output records how long its stage took.
pub trait Timed {
    fn set_duration(&mut self, secs: f64);
}

macro_rules! impl_timed {
    ($($t:ty),*) => {
        $(impl Timed for $t {
            fn set_duration(&mut self, secs: f64) {
                self.duration_sec = secs;
            }
        })*
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextMode {
    Manual,
    Assumptions,
    Collected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextOutput {
    pub mode: ContextMode,
    pub signals: Vec<Signal>,
    #[serde(default)]
    pub sources_run: Vec<String>,
    #[serde(default)]
    pub sources_failed: Vec<String>,
    /// Signals filled in from recently cached URLs
    #[serde(default)]
    pub from_cache: usize,
    pub duration_sec: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub candidates: Vec<Candidate>,
    pub duration_sec: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingOutput {
    pub passed: Vec<Candidate>,
    pub rejected: Vec<Candidate>,
    pub duration_sec: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutput {
    pub depth: Depth,
    pub passed: Vec<Candidate>,
    pub rejected: Vec<Candidate>,
    /// Reasoning calls that failed and fell back to neutral ratios
    pub reasoning_failures: usize,
    pub duration_sec: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringOutput {
    pub source: ScoreSource,
    /// Graded, highest composite first
    pub graded: Vec<Candidate>,
    pub duplicates: Vec<Candidate>,
    pub duration_sec: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicationOutput {
    pub published: usize,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
    pub archived: usize,
    pub duration_sec: f64,
}

impl_timed!(
    ContextOutput,
    GenerationOutput,
    MatchingOutput,
    ValidationOutput,
    ScoringOutput,
    PublicationOutput
);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageOutputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<GenerationOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matching: Option<MatchingOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring: Option<ScoringOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication: Option<PublicationOutput>,
}

impl StageOutputs {
    /// Number of stages that produced output.
    pub fn completed(&self) -> usize {
        [
            self.context.is_some(),
            self.generation.is_some(),
            self.matching.is_some(),
            self.validation.is_some(),
            self.scoring.is_some(),
            self.publication.is_some(),
        ]
        .iter()
        .filter(|done| **done)
        .count()
    }
}
