//! External command execution with timeouts and cancellation

use crate::error::{ReplicatorError, Result};
use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A command line to execute, plus optional bytes to feed on stdin
#[derive(Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<Vec<u8>>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            stdin: None,
        }
    }

    pub fn with_stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

// stdin may carry secrets, so it is never displayed
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("command", &self.to_string())
            .field("stdin", &self.stdin.as_ref().map(|s| s.len()))
            .finish()
    }
}

/// Runs a single external command to completion
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `spec`. The process is killed if `timeout` elapses or `cancel` fires.
    async fn run(
        &self,
        spec: &CommandSpec,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Runs commands as child processes of the replicator
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    stream_output: bool,
}

impl ProcessRunner {
    pub fn new(stream_output: bool) -> Self {
        Self { stream_output }
    }

    fn output_stdio(&self) -> Stdio {
        if self.stream_output {
            Stdio::inherit()
        } else {
            Stdio::null()
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let command = spec.to_string();
        if cancel.is_cancelled() {
            debug!(%command, "cancelled before start");
            return Err(ReplicatorError::CommandCancelled { command });
        }
        debug!(%command, timeout = %humantime::format_duration(timeout), "executing command");

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(self.output_stdio())
            .stderr(self.output_stdio())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ReplicatorError::Command {
                command: command.clone(),
                reason: format!("failed to start: {}", e),
            })?;
        let stdin = child.stdin.take();

        tokio::select! {
            status = async {
                if let (Some(input), Some(mut stdin)) = (&spec.stdin, stdin) {
                    // A child that exits without reading stdin reports through its status.
                    if let Err(e) = stdin.write_all(input).await {
                        debug!(%command, error = %e, "failed to write command stdin");
                    }
                }
                child.wait().await
            } => {
                let status = status?;
                if status.success() {
                    Ok(())
                } else {
                    Err(ReplicatorError::Command {
                        command,
                        reason: format!("finished with {}", status),
                    })
                }
            }
            _ = tokio::time::sleep(timeout) => {
                child.kill().await.map_err(|e| ReplicatorError::Command {
                    command: command.clone(),
                    reason: format!("failed to kill timed out process: {}", e),
                })?;
                warn!(%command, "process killed as timeout");
                Err(ReplicatorError::CommandTimeout { command, timeout })
            }
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    warn!(%command, error = %e, "failed to kill cancelled process");
                }
                debug!(%command, "process killed on cancellation");
                Err(ReplicatorError::CommandCancelled { command })
            }
        }
    }
}
