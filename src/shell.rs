//! Run configured shell commands that print JSON on stdout.

use anyhow::{Context, Result};
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::errors::{STDERR_PREVIEW_CHARS, truncate_chars};
use crate::invoker::decode_output;
use crate::util::extract_json;

/// Run `sh -c <command>` and parse the first JSON value it prints.
pub async fn run_shell_json(command: &str, limit: Duration) -> Result<Value> {
    let child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn `{}`", command))?;

    let output = tokio::time::timeout(limit, child.wait_with_output())
        .await
        .map_err(|_| anyhow::anyhow!("`{}` timed out after {}s", command, limit.as_secs()))?
        .with_context(|| format!("Failed to wait for `{}`", command))?;

    if !output.status.success() {
        anyhow::bail!(
            "`{}` exited with {}: {}",
            command,
            output.status.code().unwrap_or(-1),
            truncate_chars(&decode_output(&output.stderr), STDERR_PREVIEW_CHARS)
        );
    }

    let stdout = decode_output(&output.stdout);
    extract_json(&stdout).with_context(|| format!("`{}` printed no JSON", command))
}

/// Quote a value for safe substitution into a `sh -c` command line.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parses_stdout_json() {
        let value = run_shell_json(r#"echo 'noise [1, 2] tail'"#, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(value, serde_json::json!([1, 2]));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_error() {
        let err = run_shell_json("echo boom >&2; exit 4", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exited with 4"));
    }

    #[tokio::test]
    async fn test_timeout_is_error() {
        let err = run_shell_json("sleep 5", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[tokio::test]
    async fn test_quoted_value_round_trips_through_shell() {
        let cmd = format!("printf '[\"%s\"]' {}", shell_quote("a 'b' $c"));
        let value = run_shell_json(&cmd, Duration::from_secs(5)).await.unwrap();
        assert_eq!(value[0], "a 'b' $c");
    }
}
