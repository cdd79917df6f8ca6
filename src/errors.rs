//! Typed error hierarchy for the ideation engine.
//!
//! Three top-level enums cover the three failure domains:
//! - `InvokeError`: one failed attempt at the external reasoning process
//! - `PipelineError`: run-level failures that abort the remaining stages
//! - `ConcurrencyError`: slot-file I/O problems (admission rejection is not an error)

use thiserror::Error;

/// Maximum number of stderr characters carried by [`InvokeError::NonZeroExit`].
pub const STDERR_PREVIEW_CHARS: usize = 500;

/// A single transient failure of the external reasoning process.
///
/// Every variant is retryable; the invoker turns an exhausted sequence of these
/// into [`PipelineError::InvokerExhausted`].
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("Failed to spawn reasoning process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Reasoning process timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Reasoning process exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("No JSON found in reasoning output (first 200 chars): {preview}")]
    NoJson { preview: String },

    #[error("Unbalanced JSON in reasoning output (first 300 chars): {preview}")]
    Unbalanced { preview: String },

    #[error("JSON parse error: {source} (first 300 chars): {preview}")]
    Parse {
        #[source]
        source: serde_json::Error,
        preview: String,
    },

    #[error("Reasoning process I/O failed: {0}")]
    Io(#[source] std::io::Error),
}

/// Run-level failures. Any of these aborts the remaining stages and is
/// recorded in the run's `error` field.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pre-flight check failed:\n{}", format_failures(.0))]
    Preflight(Vec<String>),

    #[error("Reasoning service failed after {attempts} attempts: {last}")]
    InvokerExhausted {
        attempts: u32,
        #[source]
        last: InvokeError,
    },

    #[error("Stage {stage} failed: {message}")]
    Stage { stage: String, message: String },

    #[error("Catalog error: {0}")]
    Catalog(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn format_failures(failures: &[String]) -> String {
    failures
        .iter()
        .map(|f| format!("  - {}", f))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors from the file-backed concurrency gate.
#[derive(Debug, Error)]
pub enum ConcurrencyError {
    #[error("Failed to create lock directory {path}: {source}")]
    LockDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open slot file {path}: {source}")]
    SlotOpen {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write owner metadata to {path}: {source}")]
    OwnerWrite {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Truncate a string to at most `max` characters, respecting char boundaries.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoke_error_non_zero_exit_carries_code_and_stderr() {
        let err = InvokeError::NonZeroExit {
            code: 2,
            stderr: "rate limited".to_string(),
        };
        match &err {
            InvokeError::NonZeroExit { code, stderr } => {
                assert_eq!(*code, 2);
                assert_eq!(stderr, "rate limited");
            }
            _ => panic!("Expected NonZeroExit"),
        }
        assert!(err.to_string().contains("code 2"));
    }

    #[test]
    fn invoke_error_spawn_is_matchable() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "claude not found");
        let err = InvokeError::Spawn(io_err);
        match &err {
            InvokeError::Spawn(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            _ => panic!("Expected Spawn variant"),
        }
    }

    #[test]
    fn preflight_error_lists_every_failure() {
        let err = PipelineError::Preflight(vec![
            "Catalog DB not found".to_string(),
            "Disk space critically low".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Pre-flight check failed:\n  - Catalog DB not found\n  - Disk space critically low"
        );
    }

    #[test]
    fn invoker_exhausted_keeps_last_error_as_source() {
        use std::error::Error as _;
        let err = PipelineError::InvokerExhausted {
            attempts: 3,
            last: InvokeError::Timeout { secs: 600 },
        };
        assert!(err.to_string().contains("3 attempts"));
        let source = err.source().expect("source");
        assert!(source.to_string().contains("600s"));
    }

    #[test]
    fn pipeline_error_converts_from_anyhow() {
        let err: PipelineError = anyhow::anyhow!("disk full").into();
        assert!(matches!(err, PipelineError::Other(_)));
    }

    #[test]
    fn truncate_chars_respects_multibyte_boundaries() {
        assert_eq!(truncate_chars("가나다라", 2), "가나");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&InvokeError::Timeout { secs: 1 });
        assert_std_error(&PipelineError::Preflight(vec![]));
        assert_std_error(&ConcurrencyError::SlotOpen {
            path: "x".into(),
            source: std::io::Error::other("boom"),
        });
    }
}
