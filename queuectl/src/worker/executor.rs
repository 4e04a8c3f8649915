/*
 *  Copyright 2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Shell-command executor.
//!
//! Runs one job command as a child of the worker process, through a shell
//! interpreter so pipelines, redirection and the `exit` builtin behave as
//! users expect. Captures stdout and stderr with a per-stream cap, and
//! enforces the configured wall-clock timeout with SIGTERM followed by
//! SIGKILL after a grace period.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::ExecutionError;
use crate::models::job::AttemptOutput;

/// Per-stream capture cap. Anything beyond it is discarded and the
/// capture is marked truncated.
pub const OUTPUT_CAP_BYTES: usize = 64 * 1024;

/// Conventional exit code recorded for timed-out jobs.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// How long a timed-out child gets between SIGTERM and SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Marker appended to a capped capture.
const TRUNCATION_MARKER: &str = "\n... [truncated]";

/// Result of one execution attempt.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub output: AttemptOutput,
    /// `None` means the attempt succeeded (exit code 0).
    pub error: Option<ExecutionError>,
}

impl CommandOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Executes job commands under a timeout with capped output capture.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    timeout: Duration,
    output_cap: usize,
}

impl CommandExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            output_cap: OUTPUT_CAP_BYTES,
        }
    }

    #[cfg(test)]
    fn with_output_cap(timeout: Duration, output_cap: usize) -> Self {
        Self {
            timeout,
            output_cap,
        }
    }

    /// Runs one command to completion (or timeout) and classifies the
    /// attempt.
    pub async fn execute(&self, command: &str) -> CommandOutcome {
        let mut child = match shell_command(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return CommandOutcome {
                    output: AttemptOutput::default(),
                    error: Some(ExecutionError::Spawn(e.to_string())),
                };
            }
        };

        let cap = self.output_cap;
        let stdout_task = tokio::spawn(read_capped(child.stdout.take(), cap));
        let stderr_task = tokio::spawn(read_capped(child.stderr.take(), cap));

        let waited = tokio::time::timeout(self.timeout, child.wait()).await;

        let (exit_code, error) = match waited {
            Ok(Ok(status)) => classify_exit(status),
            Ok(Err(e)) => (None, Some(ExecutionError::Spawn(e.to_string()))),
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "job timed out, terminating child");
                terminate(&mut child).await;
                (Some(TIMEOUT_EXIT_CODE), Some(ExecutionError::Timeout))
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        debug!(?exit_code, "command finished");
        CommandOutcome {
            output: AttemptOutput {
                stdout,
                stderr,
                exit_code,
            },
            error,
        }
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

fn classify_exit(status: std::process::ExitStatus) -> (Option<i32>, Option<ExecutionError>) {
    if status.success() {
        return (status.code(), None);
    }
    match status.code() {
        Some(code) => (Some(code), Some(ExecutionError::NonZeroExit(code))),
        None => {
            #[cfg(unix)]
            let signal = {
                use std::os::unix::process::ExitStatusExt;
                status.signal().unwrap_or(0)
            };
            #[cfg(not(unix))]
            let signal = 0;
            (None, Some(ExecutionError::Killed(signal)))
        }
    }
}

/// SIGTERM, a grace period, then SIGKILL.
#[cfg(unix)]
async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
            return;
        }
        warn!(pid, "child ignored SIGTERM, sending SIGKILL");
    }
    let _ = child.kill().await;
}

#[cfg(not(unix))]
async fn terminate(child: &mut Child) {
    let _ = child.kill().await;
}

/// Drains a child stream, keeping at most `cap` bytes and marking any
/// overflow. The stream is read to EOF either way so the child never
/// blocks on a full pipe.
async fn read_capped<R>(stream: Option<R>, cap: usize) -> String
where
    R: AsyncRead + Unpin + Send,
{
    let Some(mut stream) = stream else {
        return String::new();
    };

    let mut kept = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if kept.len() < cap {
                    let take = n.min(cap - kept.len());
                    kept.extend_from_slice(&chunk[..take]);
                    if take < n {
                        truncated = true;
                    }
                } else {
                    truncated = true;
                }
            }
            Err(_) => break,
        }
    }

    let mut text = String::from_utf8_lossy(&kept).into_owned();
    if truncated {
        text.push_str(TRUNCATION_MARKER);
    }
    text
}
