//! Bounded, retrying calls to the external reasoning service.
//!
//! `Invoker` wraps a [`ProcessRunner`] with exit-code checks, robust JSON
//! extraction, and exponential backoff. Callers see a single
//! [`ReasoningService::invoke`] that either returns parsed JSON or a fatal
//! [`PipelineError::InvokerExhausted`].

pub mod dry_run;
pub mod runner;

pub use dry_run::DryRunReasoning;
pub use runner::{CliRunner, ProcessOutput, ProcessRunner, decode_output};

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::engine_config::ReasoningSection;
use crate::errors::{InvokeError, PipelineError, STDERR_PREVIEW_CHARS, truncate_chars};
use crate::util::extract_json;

/// What a reasoning call is for. Carried into logs and used by the dry-run service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Assumptions,
    Generation,
    Validation,
    BatchValidation,
    Scoring,
}

impl Purpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Purpose::Assumptions => "assumptions",
            Purpose::Generation => "generation",
            Purpose::Validation => "validation",
            Purpose::BatchValidation => "batch_validation",
            Purpose::Scoring => "scoring",
        }
    }
}

/// The narrow interface stages use to talk to the reasoning service.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn invoke(&self, prompt: &str, purpose: Purpose) -> Result<Value, PipelineError>;
}

/// Exponential backoff: `min(base * 2^(attempt-1), max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub wait_base: Duration,
    pub wait_max: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, wait_base: Duration, wait_max: Duration) -> Self {
        Self {
            max_retries,
            wait_base,
            wait_max,
        }
    }

    /// Delay before the retry that follows failed `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.wait_base.saturating_mul(1u32 << exponent);
        delay.min(self.wait_max)
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(2), Duration::from_secs(30))
    }
}

/// Abstracts waiting so backoff can be observed in tests.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Production reasoning service backed by an external process.
pub struct Invoker {
    runner: Arc<dyn ProcessRunner>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl Invoker {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        sleeper: Arc<dyn Sleeper>,
        policy: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            sleeper,
            policy,
            timeout,
        }
    }

    /// Build the CLI-backed invoker from the `[reasoning]` section.
    pub fn from_config(command: &str, section: &ReasoningSection) -> Self {
        let runner = CliRunner::new(command, section.args.clone());
        Self::new(
            Arc::new(runner),
            Arc::new(TokioSleeper),
            RetryPolicy::new(
                section.max_retries,
                Duration::from_secs(section.wait_base_sec),
                Duration::from_secs(section.wait_max_sec),
            ),
            Duration::from_secs(section.timeout_sec),
        )
    }

    /// One attempt: run, check exit status, decode, extract JSON.
    async fn attempt(&self, prompt: &str) -> Result<Value, InvokeError> {
        let output = self.runner.run(prompt, self.timeout).await?;
        let stdout = decode_output(&output.stdout);
        if !output.success() {
            let stderr = decode_output(&output.stderr);
            return Err(InvokeError::NonZeroExit {
                code: output.code.unwrap_or(-1),
                stderr: truncate_chars(&stderr, STDERR_PREVIEW_CHARS),
            });
        }
        extract_json(&stdout)
    }
}

#[async_trait]
impl ReasoningService for Invoker {
    async fn invoke(&self, prompt: &str, purpose: Purpose) -> Result<Value, PipelineError> {
        let mut attempt = 1;
        loop {
            match self.attempt(prompt).await {
                Ok(value) => {
                    info!(purpose = purpose.as_str(), attempt, "Reasoning call succeeded");
                    return Ok(value);
                }
                Err(e) => {
                    warn!(
                        purpose = purpose.as_str(),
                        attempt,
                        error = %e,
                        "Reasoning attempt failed"
                    );
                    if attempt > self.policy.max_retries {
                        error!(
                            purpose = purpose.as_str(),
                            attempt,
                            trigger = "escalation",
                            "Reasoning service exhausted all attempts"
                        );
                        return Err(PipelineError::InvokerExhausted {
                            attempts: attempt,
                            last: e,
                        });
                    }
                    let wait = self.policy.delay_for(attempt);
                    info!(attempt, wait_sec = wait.as_secs_f64(), "Retrying reasoning call");
                    self.sleeper.sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use serde_json::json;

    fn invoker(runner: Arc<ScriptedRunner>, sleeper: Arc<RecordingSleeper>) -> Invoker {
        Invoker::new(
            runner,
            sleeper,
            RetryPolicy::new(2, Duration::from_secs(2), Duration::from_secs(30)),
            Duration::from_secs(600),
        )
    }

    #[test]
    fn test_retry_policy_delays_double_and_cap() {
        let policy = RetryPolicy::new(6, Duration::from_secs(2), Duration::from_secs(30));
        let delays: Vec<u64> = (1..=6).map(|a| policy.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn test_retry_policy_huge_attempt_does_not_overflow() {
        let policy = RetryPolicy::new(100, Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(90), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_invoke_success_first_attempt() {
        let runner = Arc::new(ScriptedRunner::new(vec![ok_stdout(r#"{"ok": true}"#)], || {
            ok_stdout("{}")
        }));
        let sleeper = Arc::new(RecordingSleeper::default());
        let inv = invoker(runner.clone(), sleeper.clone());

        let value = inv.invoke("prompt", Purpose::Generation).await.unwrap();
        assert_eq!(value, json!({"ok": true}));
        assert_eq!(runner.call_count(), 1);
        assert!(sleeper.waits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invoke_extracts_fenced_json_with_trailing_commentary() {
        let runner = Arc::new(ScriptedRunner::new(
            vec![ok_stdout("```json\n{\"a\":1}\n``` trailing commentary")],
            || ok_stdout("{}"),
        ));
        let inv = invoker(runner, Arc::new(RecordingSleeper::default()));
        let value = inv.invoke("p", Purpose::Scoring).await.unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_invoke_retries_then_succeeds() {
        let runner = Arc::new(ScriptedRunner::new(
            vec![
                exit_with(1, "overloaded"),
                ok_stdout("not json at all"),
                ok_stdout(r#"[1, 2]"#),
            ],
            || ok_stdout("{}"),
        ));
        let sleeper = Arc::new(RecordingSleeper::default());
        let inv = invoker(runner.clone(), sleeper.clone());

        let value = inv.invoke("p", Purpose::Validation).await.unwrap();
        assert_eq!(value, json!([1, 2]));
        assert_eq!(runner.call_count(), 3);
        assert_eq!(
            *sleeper.waits.lock().unwrap(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[tokio::test]
    async fn test_invoke_exhausts_after_max_retries() {
        let runner = Arc::new(ScriptedRunner::new(vec![], || exit_with(2, "boom")));
        let sleeper = Arc::new(RecordingSleeper::default());
        let inv = invoker(runner.clone(), sleeper.clone());

        let err = inv.invoke("p", Purpose::Generation).await.unwrap_err();
        match err {
            PipelineError::InvokerExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(last, InvokeError::NonZeroExit { code: 2, .. }));
            }
            other => panic!("Expected InvokerExhausted, got {other:?}"),
        }
        // one initial attempt + exactly max_retries retries
        assert_eq!(runner.call_count(), 3);
        assert_eq!(sleeper.waits.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invoke_empty_output_is_retried() {
        let runner = Arc::new(ScriptedRunner::new(
            vec![ok_stdout(""), ok_stdout(r#"{"second": 2}"#)],
            || ok_stdout("{}"),
        ));
        let inv = invoker(runner.clone(), Arc::new(RecordingSleeper::default()));
        let value = inv.invoke("p", Purpose::Assumptions).await.unwrap();
        assert_eq!(value, json!({"second": 2}));
        assert_eq!(runner.call_count(), 2);
    }

    #[tokio::test]
    async fn test_invoke_timeout_is_retried() {
        let runner = Arc::new(ScriptedRunner::new(
            vec![Err(InvokeError::Timeout { secs: 600 })],
            || ok_stdout(r#"{"late": true}"#),
        ));
        let inv = invoker(runner.clone(), Arc::new(RecordingSleeper::default()));
        let value = inv.invoke("p", Purpose::Scoring).await.unwrap();
        assert_eq!(value, json!({"late": true}));
    }

    #[tokio::test]
    async fn test_zero_retries_fails_after_single_attempt() {
        let runner = Arc::new(ScriptedRunner::new(vec![], || exit_with(1, "e")));
        let sleeper = Arc::new(RecordingSleeper::default());
        let inv = Invoker::new(
            runner.clone(),
            sleeper.clone(),
            RetryPolicy::new(0, Duration::ZERO, Duration::ZERO),
            Duration::from_secs(1),
        );
        let err = inv.invoke("p", Purpose::Scoring).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvokerExhausted { attempts: 1, .. }
        ));
        assert_eq!(runner.call_count(), 1);
        assert!(sleeper.waits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_attempt_truncates_long_stderr() {
        fn long_failure() -> Result<ProcessOutput, InvokeError> {
            exit_with(1, &"e".repeat(2000))
        }
        let runner = Arc::new(ScriptedRunner::new(vec![], long_failure));
        let inv = invoker(runner, Arc::new(RecordingSleeper::default()));
        match inv.attempt("p").await.unwrap_err() {
            InvokeError::NonZeroExit { stderr, .. } => assert_eq!(stderr.len(), 500),
            other => panic!("Expected NonZeroExit, got {other:?}"),
        }
    }
}
