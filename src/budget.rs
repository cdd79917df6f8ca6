//! Wall-clock budget for a single pipeline run.
//!
//! Each stage owns a fixed base allocation and may draw on a shared variable
//! pool. Overshoot past the base is deducted from the pool when the stage
//! ends, so later stages see a smaller allocation. The pool never goes
//! negative and only resets when a new `TimeBudget` is created for a new run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::info;

use crate::engine_config::BudgetSection;

/// The six ordered pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Context,
    Generation,
    Matching,
    Validation,
    Scoring,
    Publication,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Context,
        Stage::Generation,
        Stage::Matching,
        Stage::Validation,
        Stage::Scoring,
        Stage::Publication,
    ];

    /// 1-based stage number.
    pub fn number(self) -> u8 {
        match self {
            Stage::Context => 1,
            Stage::Generation => 2,
            Stage::Matching => 3,
            Stage::Validation => 4,
            Stage::Scoring => 5,
            Stage::Publication => 6,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Context => "context",
            Stage::Generation => "generation",
            Stage::Matching => "matching",
            Stage::Validation => "validation",
            Stage::Scoring => "scoring",
            Stage::Publication => "publication",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.number(), self.name())
    }
}

/// How much per-candidate reasoning work the validation stage may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    /// Not enough time left: validation abandoned, neutral defaults downstream.
    Skipped,
    /// Deterministic sub-scores only, no reasoning calls.
    Simplified,
    /// Few candidates, one reasoning call each.
    Deep,
    /// Moderate count, one reasoning call each.
    Standard,
    /// Many candidates, one batched reasoning call.
    Light,
}

impl std::fmt::Display for Depth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Depth::Skipped => "skipped",
            Depth::Simplified => "simplified",
            Depth::Deep => "deep",
            Depth::Standard => "standard",
            Depth::Light => "light",
        };
        write!(f, "{}", s)
    }
}

/// Source of monotonic time. Injected so budget arithmetic is testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// Production clock measuring from its own creation instant.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-advanced clock for tests and dry runs.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.lock().map(|n| *n).unwrap_or_default()
    }
}

/// Tracks elapsed and remaining time for one run.
pub struct TimeBudget {
    config: BudgetSection,
    clock: Arc<dyn Clock>,
    started_at: Duration,
    pool_remaining: u64,
    stage_starts: HashMap<Stage, Duration>,
    stage_elapsed: HashMap<Stage, f64>,
}

impl TimeBudget {
    pub fn new(config: BudgetSection, clock: Arc<dyn Clock>) -> Self {
        let started_at = clock.now();
        let pool_remaining = config.variable_pool_sec;
        Self {
            config,
            clock,
            started_at,
            pool_remaining,
            stage_starts: HashMap::new(),
            stage_elapsed: HashMap::new(),
        }
    }

    pub fn elapsed_sec(&self) -> f64 {
        self.clock.now().saturating_sub(self.started_at).as_secs_f64()
    }

    pub fn remaining_sec(&self) -> f64 {
        (self.config.total_sec as f64 - self.elapsed_sec()).max(0.0)
    }

    pub fn pool_remaining(&self) -> u64 {
        self.pool_remaining
    }

    /// Elapsed seconds recorded by `end_phase`, if the stage has finished.
    pub fn stage_elapsed(&self, stage: Stage) -> Option<f64> {
        self.stage_elapsed.get(&stage).copied()
    }

    /// Maximum seconds a stage may use right now.
    pub fn phase_budget(&self, stage: Stage) -> f64 {
        let base = self.config.base_for(stage);
        let variable = self.config.variable_max_for(stage).min(self.pool_remaining);
        ((base + variable) as f64).min(self.remaining_sec())
    }

    /// Record the stage start and return its budget in seconds.
    pub fn start_phase(&mut self, stage: Stage) -> f64 {
        self.stage_starts.insert(stage, self.clock.now());
        let budget = self.phase_budget(stage);
        info!(
            stage = stage.number(),
            budget_sec = budget,
            pool_remaining = self.pool_remaining,
            "Stage {} started",
            stage
        );
        budget
    }

    /// Record the stage end, charge any overshoot to the pool, return elapsed seconds.
    ///
    /// A stage that was never started yields 0.
    pub fn end_phase(&mut self, stage: Stage) -> f64 {
        let Some(start) = self.stage_starts.get(&stage).copied() else {
            return 0.0;
        };
        let elapsed = self.clock.now().saturating_sub(start).as_secs_f64();
        let base = self.config.base_for(stage) as f64;
        let overshoot = (elapsed - base).max(0.0);
        if overshoot > 0.0 {
            let deducted = (overshoot.floor() as u64).min(self.pool_remaining);
            self.pool_remaining -= deducted;
            info!(
                stage = stage.number(),
                duration_sec = elapsed,
                deducted,
                pool_remaining = self.pool_remaining,
                "Stage {} overran its base by {:.0}s",
                stage,
                overshoot
            );
        } else {
            info!(
                stage = stage.number(),
                duration_sec = elapsed,
                "Stage {} completed within base {}s",
                stage,
                base
            );
        }
        self.stage_elapsed.insert(stage, elapsed);
        elapsed
    }

    /// Decide how much validation work to do for `candidate_count` candidates.
    pub fn adaptive_depth(&self, candidate_count: usize) -> Depth {
        let remaining = self.remaining_sec();
        if remaining < self.config.skip_threshold_sec as f64 {
            return Depth::Skipped;
        }
        if remaining < self.config.simplify_threshold_sec as f64 {
            return Depth::Simplified;
        }
        if candidate_count <= self.config.deep_max_candidates {
            Depth::Deep
        } else if candidate_count <= self.config.standard_max_candidates {
            Depth::Standard
        } else {
            Depth::Light
        }
    }
}
