//! The six pipeline stages.
//!
//! Each stage is an async function taking the shared [`StageContext`] and the
//! previous stage's output. Degraded results come back as
//! [`StageOutcome::Partial`](super::outputs::StageOutcome); only conditions
//! that must stop the run are returned as `Err`.

pub mod context;
pub mod generation;
pub mod matching;
pub mod scoring;
pub mod publication;
pub mod validation;

use chrono::{DateTime, Utc};

use super::collaborators::Collaborators;
use crate::config::Config;

/// Read-only state shared by every stage of one run.
pub struct StageContext<'a> {
    pub config: &'a Config,
    pub collabs: &'a Collaborators,
    pub batch_id: &'a str,
    pub now: DateTime<Utc>,
}
