//! Shared test utilities for the installer crate.

use crate::command::CommandExecutor;
use crate::error::{InstallerError, Result};
use crate::retry::Sleeper;
use crate::upstream::transport::{HttpResponse, HttpTransport, TransportError};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::process::{ExitStatus, Output};
use std::time::Duration;

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code.unsigned_abs())
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    output_with_stdout("")
}

/// Creates a successful command `Output` whose stdout is `stdout`.
#[must_use]
pub fn output_with_stdout(stdout: &str) -> Output {
    Output {
        status: exit_status(0),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Represents an expected command invocation for testing.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The command to execute (e.g., "helm").
    pub cmd: &'static str,
    /// The arguments to pass to the command.
    pub args: Vec<String>,
    /// The result to return when this command is invoked.
    pub result: Result<Output>,
}

impl ExpectedCall {
    /// Expects `cmd args...` and answers with `result`.
    #[must_use]
    pub fn new(cmd: &'static str, args: &[&str], result: Result<Output>) -> Self {
        Self {
            cmd,
            args: args.iter().map(|arg| (*arg).to_owned()).collect(),
            result,
        }
    }
}

/// A stub implementation of `CommandExecutor` for testing.
///
/// Records expected command invocations and returns predefined results,
/// allowing tests to verify command execution without side effects. An
/// unexpected invocation yields [`InstallerError::StubMismatch`].
#[derive(Debug)]
pub struct StubExecutor {
    expected: RefCell<VecDeque<ExpectedCall>>,
    seen: RefCell<Vec<String>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: RefCell::new(expected.into()),
            seen: RefCell::new(Vec::new()),
        }
    }

    /// Returns every command line received so far, in order.
    #[must_use]
    pub fn invocations(&self) -> Vec<String> {
        self.seen.borrow().clone()
    }

    /// Returns `true` when all expected invocations have been consumed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.expected.borrow().is_empty()
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        assert!(
            self.is_finished(),
            "expected further command invocations: {:?}",
            self.expected.borrow()
        );
    }
}

impl CommandExecutor for StubExecutor {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        let line = crate::command::command_line(cmd, args);
        self.seen.borrow_mut().push(line.clone());

        let call = self
            .expected
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| InstallerError::StubMismatch {
                message: format!("unexpected command invocation: {line}"),
            })?;

        let matches = call.cmd == cmd
            && call.args.len() == args.len()
            && call.args.iter().zip(args).all(|(want, got)| want == got);
        if !matches {
            return Err(InstallerError::StubMismatch {
                message: format!(
                    "expected {}, got {line}",
                    crate::command::command_line(
                        call.cmd,
                        &call.args.iter().map(String::as_str).collect::<Vec<_>>()
                    )
                ),
            });
        }

        call.result
    }
}

/// One scripted answer of a [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct ScriptedReply {
    outcome: std::result::Result<(u16, Vec<u8>), String>,
    headers: Vec<(String, String)>,
}

impl ScriptedReply {
    /// A `200 OK` reply with `body`.
    #[must_use]
    pub fn ok(body: &str) -> Self {
        Self {
            outcome: Ok((200, body.as_bytes().to_vec())),
            headers: Vec::new(),
        }
    }

    /// A `200 OK` reply with a raw byte body.
    #[must_use]
    pub fn ok_bytes(body: &[u8]) -> Self {
        Self {
            outcome: Ok((200, body.to_vec())),
            headers: Vec::new(),
        }
    }

    /// A reply with `status` and an empty body.
    #[must_use]
    pub const fn status(status: u16) -> Self {
        Self {
            outcome: Ok((status, Vec::new())),
            headers: Vec::new(),
        }
    }

    /// A transport failure with `reason`; no response is produced.
    #[must_use]
    pub fn failure(reason: &str) -> Self {
        Self {
            outcome: Err(reason.to_owned()),
            headers: Vec::new(),
        }
    }

    /// Adds a response header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }
}

/// A request received by a [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Requested URL.
    pub url: String,
    /// Headers sent with the request.
    pub headers: Vec<(String, String)>,
}

/// An [`HttpTransport`] that replays scripted replies in order.
///
/// Once the script is exhausted every further request fails.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: RefCell<VecDeque<ScriptedReply>>,
    requests: RefCell<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    /// Creates a transport answering with `replies`.
    #[must_use]
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Returns every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.borrow().clone()
    }

    /// Returns the URLs requested so far.
    #[must_use]
    pub fn requested_urls(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .map(|request| request.url.clone())
            .collect()
    }

    /// Returns how many requests were made.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }
}

impl HttpTransport for ScriptedTransport {
    fn get(
        &self,
        url: &str,
        headers: &[(&str, String)],
    ) -> std::result::Result<HttpResponse, TransportError> {
        self.requests.borrow_mut().push(RecordedRequest {
            url: url.to_owned(),
            headers: headers
                .iter()
                .map(|(name, value)| ((*name).to_owned(), value.clone()))
                .collect(),
        });

        let reply = self
            .replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| TransportError {
                url: url.to_owned(),
                reason: "no scripted reply remaining".to_owned(),
            })?;

        match reply.outcome {
            Ok((status, body)) => Ok(reply
                .headers
                .iter()
                .fold(HttpResponse::new(status, body), |response, (name, value)| {
                    response.with_header(name, value)
                })),
            Err(reason) => Err(TransportError {
                url: url.to_owned(),
                reason,
            }),
        }
    }
}

/// A [`Sleeper`] that records requested delays instead of blocking.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Returns the delays requested so far.
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.delays.borrow_mut().push(duration);
    }
}
