//! External command execution.
//!
//! Every interaction with `helm` and `kubectl` goes through the
//! [`CommandExecutor`] trait so that orchestration logic can be exercised with
//! scripted outputs. The system implementation bounds each invocation with a
//! timeout and kills the child when it elapses.

use crate::error::{InstallerError, Result};
use std::io::Read;
use std::process::{Child, Command, Output, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;
use wait_timeout::ChildExt;

/// Abstraction for running external commands.
pub trait CommandExecutor {
    /// Runs a command with arguments and returns the captured output.
    ///
    /// A non-zero exit status is not an error at this layer; callers inspect
    /// [`Output::status`].
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::ToolMissing`] when the executable cannot be
    /// found, [`InstallerError::CommandTimeout`] when it does not finish in
    /// time, and [`InstallerError::Io`] for other spawn failures.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use envoy_ai_installer::command::{CommandExecutor, SystemCommandExecutor};
    ///
    /// let executor = SystemCommandExecutor::default();
    /// let output = executor.run("helm", &["version", "--short"])?;
    /// assert!(output.status.success());
    /// # Ok::<(), envoy_ai_installer::error::InstallerError>(())
    /// ```
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output>;
}

/// Default time budget for a single external command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Executes commands on the host system with a timeout.
#[derive(Debug, Clone, Copy)]
pub struct SystemCommandExecutor {
    timeout: Duration,
}

impl SystemCommandExecutor {
    /// Creates an executor that kills commands running longer than `timeout`.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Returns the configured timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for SystemCommandExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        log::debug!("running {}", command_line(cmd, args));
        let mut child = Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => InstallerError::ToolMissing {
                    tool: cmd.to_owned(),
                },
                _ => InstallerError::Io(err),
            })?;

        // Pipes are drained concurrently so a chatty child cannot block on a
        // full buffer while we wait for it.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        match child.wait_timeout(self.timeout)? {
            Some(status) => Ok(Output {
                status,
                stdout: join_drain(stdout),
                stderr: join_drain(stderr),
            }),
            None => {
                kill_quietly(&mut child);
                Err(InstallerError::CommandTimeout {
                    command: command_line(cmd, args),
                    timeout_secs: self.timeout.as_secs(),
                })
            }
        }
    }
}

/// Formats a command and its arguments the way an operator would type it.
///
/// # Examples
///
/// ```
/// use envoy_ai_installer::command::command_line;
///
/// assert_eq!(command_line("helm", &["repo", "update"]), "helm repo update");
/// ```
#[must_use]
pub fn command_line(cmd: &str, args: &[&str]) -> String {
    std::iter::once(cmd)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Returns trimmed stderr, or trimmed stdout when stderr is empty.
#[must_use]
pub fn failure_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::from_utf8_lossy(&output.stdout).trim().to_owned()
    } else {
        trimmed.to_owned()
    }
}

fn drain<R>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut reader| {
        std::thread::spawn(move || {
            let mut buffer = Vec::new();
            if reader.read_to_end(&mut buffer).is_err() {
                buffer.clear();
            }
            buffer
        })
    })
}

fn join_drain(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn kill_quietly(child: &mut Child) {
    if child.kill().is_err() {
        // Already exited between the timeout and the kill.
    }
    if child.wait().is_err() {
        log::debug!("failed to reap timed-out child process");
    }
}
