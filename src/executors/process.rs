// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relflow contributors

//! Process runner
//!
//! Spawns real child processes with captured output, an optional timeout
//! and cooperative cancellation.

use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{CommandRunner, ExecutionResult, ToolCommand};
use crate::errors::ReleaseError;

/// Runner backed by `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

enum Finished<T> {
    Done(T),
    Cancelled,
    TimedOut,
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!("Failed to read child output: {}", e);
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn sleep_or_forever(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending::<()>().await,
    }
}

/// The running child plus the process group it leads
struct Spawned {
    child: Child,
    group: Option<u32>,
    stdout: JoinHandle<String>,
    stderr: JoinHandle<String>,
}

impl Spawned {
    /// Kill the child and every process it started, then reap the child
    async fn terminate(&mut self, step: &str, program: &str) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            if let Some(group) = self.group {
                // ESRCH: the whole group is already gone
                if let Err(e) = killpg(Pid::from_raw(group as i32), Signal::SIGKILL) {
                    debug!("[{}] killpg({}) failed: {}", step, group, e);
                }
            }
        }

        if let Err(e) = self.child.kill().await {
            debug!("[{}] failed to kill '{}': {}", step, program, e);
        }
        self.stdout.abort();
        self.stderr.abort();
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        step: &str,
        command: &ToolCommand,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ReleaseError> {
        debug!("[{}] {}", step, command);

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(&command.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so grandchildren die with the child
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return Ok(ExecutionResult::failure(
                    format!("failed to start '{}': {}", command.program, e),
                    -1,
                ));
            }
        };

        let group = child.id();
        let stdout = tokio::spawn(read_pipe(child.stdout.take()));
        let stderr = tokio::spawn(read_pipe(child.stderr.take()));
        let mut spawned = Spawned {
            child,
            group,
            stdout,
            stderr,
        };

        let deadline = sleep_or_forever(command.timeout);
        tokio::pin!(deadline);

        let exited: Finished<std::io::Result<ExitStatus>> = tokio::select! {
            biased;
            _ = cancel.cancelled() => Finished::Cancelled,
            _ = &mut deadline => Finished::TimedOut,
            status = spawned.child.wait() => Finished::Done(status),
        };

        // The pipes stay open while anything the child started still holds
        // them, so draining is bounded by the same token and deadline
        let finished = match exited {
            Finished::Done(status) => {
                let drain = async {
                    let stdout = (&mut spawned.stdout).await.unwrap_or_default();
                    let stderr = (&mut spawned.stderr).await.unwrap_or_default();
                    (stdout, stderr)
                };
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Finished::Cancelled,
                    _ = &mut deadline => Finished::TimedOut,
                    output = drain => Finished::Done((status, output)),
                }
            }
            Finished::Cancelled => Finished::Cancelled,
            Finished::TimedOut => Finished::TimedOut,
        };

        let (status, (stdout, stderr)) = match finished {
            // The child may exit on its own after the token fired
            Finished::Done(_) if cancel.is_cancelled() => {
                spawned.terminate(step, &command.program).await;
                return Err(ReleaseError::Cancelled {
                    step: step.to_string(),
                });
            }
            Finished::Done((status, output)) => (status?, output),
            Finished::Cancelled => {
                spawned.terminate(step, &command.program).await;
                return Err(ReleaseError::Cancelled {
                    step: step.to_string(),
                });
            }
            Finished::TimedOut => {
                spawned.terminate(step, &command.program).await;
                let secs = command.timeout.map(|l| l.as_secs()).unwrap_or_default();
                warn!("[{}] '{}' timed out after {}s", step, command.program, secs);
                return Ok(ExecutionResult::failure(
                    format!("'{}' timed out after {}s", command.program, secs),
                    -1,
                ));
            }
        };

        if !stdout.trim().is_empty() {
            debug!("[{}] stdout:\n{}", step, stdout.trim_end());
        }

        Ok(ExecutionResult {
            success: status.success(),
            stdout,
            stderr,
            exit_code: status.code().unwrap_or(-1),
        })
    }

    async fn check_available(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}
