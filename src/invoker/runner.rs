//! Subprocess execution for the external reasoning CLI.
//!
//! The prompt is written to the child's stdin (command lines have length
//! limits on some platforms) while stdout and stderr are collected. The write
//! and the collection share one timeout, so a child that never drains stdin
//! cannot hold the call past its limit. A timed-out child is killed when its
//! handle drops.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::errors::InvokeError;

/// Environment variable that makes the reasoning CLI refuse nested sessions.
const NESTED_SESSION_ENV: &str = "CLAUDECODE";

/// Raw result of one process execution.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Exit code, or `None` if the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs the reasoning process once.
///
/// Real implementation: `CliRunner`. Tests inject scripted fakes.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, input: &str, limit: Duration) -> Result<ProcessOutput, InvokeError>;
}

/// Spawns `command args...` and pipes the input through stdin.
#[derive(Debug, Clone)]
pub struct CliRunner {
    command: String,
    args: Vec<String>,
}

impl CliRunner {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    /// Run `<command> --version` and report whether the CLI is callable.
    pub async fn check_version(&self, limit: Duration) -> Result<(), String> {
        let child = Command::new(&self.command)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(format!("Reasoning CLI '{}' not found in PATH", self.command));
            }
            Err(e) => return Err(format!("Reasoning CLI check failed: {}", e)),
        };
        match timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => Ok(()),
            Ok(Ok(output)) => Err(format!(
                "Reasoning CLI --version exit code {}",
                output.status.code().unwrap_or(-1)
            )),
            Ok(Err(e)) => Err(format!("Reasoning CLI check failed: {}", e)),
            Err(_) => Err(format!(
                "Reasoning CLI --version timed out ({}s)",
                limit.as_secs()
            )),
        }
    }
}

#[async_trait]
impl ProcessRunner for CliRunner {
    async fn run(&self, input: &str, limit: Duration) -> Result<ProcessOutput, InvokeError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .env_remove(NESTED_SESSION_ENV)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(InvokeError::Spawn)?;

        let stdin = child.stdin.take();
        let write = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(input.as_bytes()).await?;
                // dropping stdin closes the pipe
            }
            Ok::<(), std::io::Error>(())
        };

        let (written, output) =
            match timeout(limit, async { tokio::join!(write, child.wait_with_output()) }).await {
                Ok(pair) => pair,
                Err(_) => {
                    return Err(InvokeError::Timeout {
                        secs: limit.as_secs(),
                    });
                }
            };
        let output = output.map_err(InvokeError::Io)?;
        match written {
            // the child may exit without reading all of its input
            Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                return Err(InvokeError::Io(e));
            }
            _ => {}
        }

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Decode process output as UTF-8, falling back to EUC-KR (the WHATWG
/// superset of Windows code page 949) with replacement characters.
pub fn decode_output(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (text, _) = encoding_rs::EUC_KR.decode_without_bom_handling(bytes);
            text.into_owned()
        }
    }
}
