//! Runs the six stages in order under one time budget and records what
//! happened.
//!
//! A run is admitted through the [`ConcurrencyGate`], passes pre-flight, then
//! executes context, generation, matching, validation, scoring and
//! publication. Each stage's output is stored as soon as it finishes so a run
//! that fails part-way still leaves a useful [`RunRecord`].

pub mod collaborators;
pub mod outputs;
pub mod preflight;
pub mod prompts;
pub mod stages;
pub mod state;

use std::sync::Arc;

use chrono::{Local, Utc};
use tracing::{error, info, warn};

pub use collaborators::Collaborators;
pub use outputs::{StageOutcome, StageOutputs};
pub use state::{RunHistory, RunRecord};

use self::outputs::Timed;
use self::stages::StageContext;
use crate::budget::{Clock, MonotonicClock, Stage, TimeBudget};
use crate::concurrency::{ConcurrencyGate, SlotGuard};
use crate::config::Config;
use crate::errors::{ConcurrencyError, PipelineError, truncate_chars};
use crate::publish::{NotificationSink, build_sink, system_alert};
use crate::util::{generate_batch_id, round_to};

const FAILURE_DETAIL_CHARS: usize = 400;

/// Operator-supplied input that replaces signal collection.
#[derive(Debug, Clone, Default)]
pub struct RunInput {
    /// Free text used verbatim as the only signal.
    pub manual_signals: Option<String>,
    /// Assumption statements expanded into signals by the reasoning service.
    pub assumptions: Option<String>,
}

impl RunInput {
    pub fn manual(text: impl Into<String>) -> Self {
        Self {
            manual_signals: Some(text.into()),
            assumptions: None,
        }
    }

    pub fn needs_collection(&self) -> bool {
        self.manual_signals.is_none() && self.assumptions.is_none()
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    /// Every slot was busy; nothing ran.
    Rejected,
    Completed(RunRecord),
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Completed(record) if record.success => 0,
            _ => 1,
        }
    }
}

pub struct Orchestrator {
    config: Config,
    notifier: Arc<dyn NotificationSink>,
    collaborators: Option<Collaborators>,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn from_config(config: Config) -> Self {
        let notifier = build_sink(&config.webhook_config, &config.toml.notify);
        Self {
            config,
            notifier,
            collaborators: None,
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    /// Use these collaborators instead of building them from config.
    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = Some(collaborators);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run once if a concurrency slot is free. The slot is released when this
    /// returns, whatever the outcome.
    pub async fn run(&self, input: &RunInput) -> Result<RunOutcome, ConcurrencyError> {
        let gate = ConcurrencyGate::new(
            &self.config.lock_dir,
            self.config.toml.concurrency.max_concurrent,
        );
        let Some(guard) = SlotGuard::acquire(gate)? else {
            warn!(
                max_concurrent = self.config.toml.concurrency.max_concurrent,
                "All run slots busy, skipping this run"
            );
            return Ok(RunOutcome::Rejected);
        };
        info!(slot = ?guard.slot(), "Run admitted");

        let record = self.run_pipeline(input).await;
        drop(guard);
        Ok(RunOutcome::Completed(record))
    }

    /// Scheduler entry point: 0 when a run completed successfully, 1 otherwise.
    pub async fn run_once(&self, input: &RunInput) -> i32 {
        match self.run(input).await {
            Ok(outcome) => outcome.exit_code(),
            Err(e) => {
                error!(error = %e, "Concurrency gate failed");
                1
            }
        }
    }

    /// Execute pre-flight and all six stages. Always returns a finished
    /// record, which is also appended to the run history.
    pub async fn run_pipeline(&self, input: &RunInput) -> RunRecord {
        let batch_id = generate_batch_id(Local::now());
        let started_at = Utc::now();
        let mut budget = TimeBudget::new(self.config.toml.budget.clone(), self.clock.clone());
        let mut record = RunRecord::start(&batch_id, started_at);
        info!(
            batch_id = %batch_id,
            dry_run = self.config.dry_run,
            manual = input.manual_signals.is_some(),
            assumptions = input.assumptions.is_some(),
            "Pipeline run started"
        );

        let preflight = preflight::run_preflight(
            &self.config,
            self.collaborators.clone(),
            input.needs_collection(),
        )
        .await;

        let error = match preflight {
            Ok(collabs) => {
                let ctx = StageContext {
                    config: &self.config,
                    collabs: &collabs,
                    batch_id: &batch_id,
                    now: started_at,
                };
                match self
                    .run_stages(&ctx, input, &mut budget, &mut record.stages)
                    .await
                {
                    Ok(()) => None,
                    Err(e) => {
                        let message = e.to_string();
                        error!(batch_id = %batch_id, error = %message, "Pipeline failed");
                        self.alert(&format!(
                            "**Pipeline FAILED** (batch {})\nError: {}\nDuration: {:.0}s",
                            batch_id,
                            truncate_chars(&message, FAILURE_DETAIL_CHARS),
                            budget.elapsed_sec()
                        ))
                        .await;
                        Some(message)
                    }
                }
            }
            Err(e) => {
                let failures = match &e {
                    PipelineError::Preflight(failures) => failures.clone(),
                    other => vec![other.to_string()],
                };
                let lines: Vec<String> = failures.iter().map(|f| format!("- {}", f)).collect();
                self.alert(&format!(
                    "**Engine pre-flight FAILED** (batch {})\n{}",
                    batch_id,
                    lines.join("\n")
                ))
                .await;
                Some(e.to_string())
            }
        };

        record.finish(error, Utc::now(), budget.elapsed_sec());
        if let Err(e) = RunHistory::new(self.config.run_history_file()).append(&record) {
            warn!(error = %e, "Failed to append run history");
        }
        info!(
            batch_id = %record.batch_id,
            success = record.success,
            stages_completed = record.stages.completed(),
            duration_sec = record.total_duration_sec,
            "Pipeline run finished"
        );
        record
    }

    async fn run_stages(
        &self,
        ctx: &StageContext<'_>,
        input: &RunInput,
        budget: &mut TimeBudget,
        outputs: &mut StageOutputs,
    ) -> Result<(), PipelineError> {
        budget.start_phase(Stage::Context);
        let context = settle(budget, Stage::Context, stages::context::run(ctx, input).await)?;
        let signals = context.signals.clone();
        outputs.context = Some(context);

        budget.start_phase(Stage::Generation);
        let generation = settle(
            budget,
            Stage::Generation,
            stages::generation::run(ctx, &signals).await,
        )?;
        let candidates = generation.candidates.clone();
        outputs.generation = Some(generation);

        budget.start_phase(Stage::Matching);
        let matching = settle(
            budget,
            Stage::Matching,
            stages::matching::run(ctx, candidates).await,
        )?;
        let feasible = matching.passed.clone();
        outputs.matching = Some(matching);

        budget.start_phase(Stage::Validation);
        let depth = budget.adaptive_depth(feasible.len());
        info!(candidates = feasible.len(), depth = %depth, "Validation depth chosen");
        let validation = settle(
            budget,
            Stage::Validation,
            stages::validation::run(ctx, feasible, depth).await,
        )?;
        let validated = validation.passed.clone();
        outputs.validation = Some(validation);

        budget.start_phase(Stage::Scoring);
        let scoring = settle(
            budget,
            Stage::Scoring,
            stages::scoring::run(ctx, validated).await,
        )?;
        let graded = scoring.graded.clone();
        outputs.scoring = Some(scoring);

        budget.start_phase(Stage::Publication);
        let publication = settle(
            budget,
            Stage::Publication,
            stages::publication::run(ctx, &graded, &self.notifier).await,
        )?;
        outputs.publication = Some(publication);

        Ok(())
    }

    async fn alert(&self, description: &str) {
        if !self.notifier.send(&system_alert(description)).await {
            warn!("System alert not delivered");
        }
    }
}

/// Close the stage's budget window, log any degradation notes and stamp the
/// output with its duration.
fn settle<T: Timed>(
    budget: &mut TimeBudget,
    stage: Stage,
    result: Result<StageOutcome<T>, PipelineError>,
) -> Result<T, PipelineError> {
    let elapsed = budget.end_phase(stage);
    let outcome = result.map_err(|e| match e {
        PipelineError::Stage { .. } | PipelineError::Preflight(_) => e,
        other => PipelineError::Stage {
            stage: stage.name().to_string(),
            message: other.to_string(),
        },
    })?;
    for note in outcome.notes() {
        warn!(stage = stage.number(), note = %note, "Stage {} degraded", stage);
    }
    let mut output = outcome.into_output();
    output.set_duration(round_to(elapsed, 1));
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::stages::testing::{collaborators, test_config};
    use super::*;
    use crate::budget::{Depth, ManualClock};
    use crate::invoker::testing::FakeReasoning;
    use crate::invoker::{DryRunReasoning, ReasoningService};
    use crate::publish::ArtifactLog;
    use crate::publish::notify::testing::RecordingSink;
    use tempfile::tempdir;

    fn orchestrator(
        config: Config,
        reasoning: Arc<dyn ReasoningService>,
    ) -> (Orchestrator, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let orch = Orchestrator::from_config(config)
            .with_collaborators(collaborators(reasoning))
            .with_notifier(sink.clone())
            .with_clock(Arc::new(ManualClock::new()));
        (orch, sink)
    }

    fn descriptions(sink: &RecordingSink) -> Vec<String> {
        sink.sent
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.description.clone())
            .collect()
    }

    // =========================================
    // Full pipeline
    // =========================================

    #[tokio::test]
    async fn test_full_run_completes_every_stage() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let history = config.run_history_file();
        let artifact = config.artifact_file();
        let (orch, _sink) = orchestrator(config, Arc::new(DryRunReasoning::new()));

        let record = orch
            .run_pipeline(&RunInput::manual("air pollution worries commuters"))
            .await;
        assert!(record.success, "error: {:?}", record.error);
        assert!(record.is_finished());
        assert_eq!(record.stages.completed(), 6);

        let stages = &record.stages;
        assert_eq!(stages.context.as_ref().unwrap().signals.len(), 1);
        assert_eq!(stages.generation.as_ref().unwrap().candidates.len(), 5);
        assert!(!stages.matching.as_ref().unwrap().passed.is_empty());
        assert_eq!(stages.validation.as_ref().unwrap().depth, Depth::Standard);
        let published = stages.publication.as_ref().unwrap().published;
        assert_eq!(published, stages.scoring.as_ref().unwrap().graded.len());

        let batches = ArtifactLog::new(artifact).read_all().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].batch_id, record.batch_id);
        let entries = RunHistory::new(history).entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].success);
    }

    #[tokio::test]
    async fn test_short_budget_skips_validation() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.toml.budget.total_sec = 60;
        let (orch, _sink) = orchestrator(config, Arc::new(DryRunReasoning::new()));

        let record = orch.run_pipeline(&RunInput::manual("budget squeeze")).await;
        assert!(record.success);
        let validation = record.stages.validation.as_ref().unwrap();
        assert_eq!(validation.depth, Depth::Skipped);
        assert!(validation.rejected.is_empty());
        let scoring = record.stages.scoring.as_ref().unwrap();
        for idea in &scoring.graded {
            assert_eq!(idea.scoring.as_ref().unwrap().scores.v, 3.0);
        }
    }

    // =========================================
    // Failures
    // =========================================

    #[tokio::test]
    async fn test_generation_failure_keeps_earlier_stages_and_alerts() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let history = config.run_history_file();
        let (orch, sink) = orchestrator(config, Arc::new(FakeReasoning::default()));

        let record = orch.run_pipeline(&RunInput::manual("anything")).await;
        assert!(!record.success);
        assert!(record.error.is_some());
        assert!(record.stages.context.is_some());
        assert!(record.stages.generation.is_none());
        assert_eq!(record.stages.completed(), 1);

        let alerts = descriptions(&sink);
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].starts_with("**Pipeline FAILED**"));
        assert!(alerts[0].contains(&record.batch_id));

        let entries = RunHistory::new(history).entries().unwrap();
        assert!(!entries[0].success);
    }

    #[tokio::test]
    async fn test_preflight_failure_alerts_and_runs_nothing() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.dry_run = true;
        let sink = Arc::new(RecordingSink::default());
        let orch = Orchestrator::from_config(config).with_notifier(sink.clone());

        let record = orch.run_pipeline(&RunInput::manual("no catalog here")).await;
        assert!(!record.success);
        assert_eq!(record.stages.completed(), 0);
        let alerts = descriptions(&sink);
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].contains("pre-flight FAILED"));
        assert!(alerts[0].contains("Catalog unavailable"));
    }

    // =========================================
    // Admission
    // =========================================

    #[tokio::test]
    async fn test_rejected_when_all_slots_busy() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.toml.concurrency.max_concurrent = 1;
        let mut holder = ConcurrencyGate::new(&config.lock_dir, 1);
        assert!(holder.acquire().unwrap());

        let (orch, sink) = orchestrator(config, Arc::new(DryRunReasoning::new()));
        let input = RunInput::manual("busy");
        let outcome = orch.run(&input).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Rejected));
        assert_eq!(outcome.exit_code(), 1);
        assert!(sink.sent.lock().unwrap().is_empty());

        holder.release();
        assert_eq!(orch.run_once(&input).await, 0);
    }

    #[test]
    fn test_needs_collection_only_without_operator_input() {
        assert!(RunInput::default().needs_collection());
        assert!(!RunInput::manual("x").needs_collection());
        let assumptions = RunInput {
            assumptions: Some("people want y".into()),
            ..Default::default()
        };
        assert!(!assumptions.needs_collection());
    }
}
