// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! An injectable seam for running host commands, so adapters can be driven
//! by scripted command/response pairs under test.

use crate::{output_to_exec_error, ExecutionError};

use async_trait::async_trait;
use slog::{debug, error, info, Logger};
use std::fmt;
use std::process::{Command, ExitStatus, Output};
use std::str::from_utf8;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// The command line an executor was asked to run, with the program and
/// arguments normalized to UTF-8 for comparison and display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Input {
    pub program: String,
    pub args: Vec<String>,
}

impl Input {
    /// Builds an [Input] from a whitespace-separated command line.
    ///
    /// Panics on an empty string; this is a test-construction helper.
    pub fn shell<S: AsRef<str>>(input: S) -> Self {
        let mut words = input.as_ref().split_whitespace().map(String::from);
        let program = words.next().expect("no program in command line");
        Self { program, args: words.collect() }
    }
}

impl From<&Command> for Input {
    fn from(command: &Command) -> Self {
        Self {
            program: command.get_program().to_string_lossy().to_string(),
            args: command
                .get_args()
                .map(|a| a.to_string_lossy().to_string())
                .collect(),
        }
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Constructors for fabricating [Output] values in fakes and tests.
pub trait OutputExt: Sized {
    fn success() -> Self;
    fn failure() -> Self;
    fn exit_status(code: i32) -> Self;
    fn set_stdout<S: AsRef<str>>(self, stdout: S) -> Self;
    fn set_stderr<S: AsRef<str>>(self, stderr: S) -> Self;
}

impl OutputExt for Output {
    fn success() -> Self {
        Self::exit_status(0)
    }

    fn failure() -> Self {
        Self::exit_status(1)
    }

    fn exit_status(code: i32) -> Self {
        use std::os::unix::process::ExitStatusExt;
        Output {
            // Wait status encoding: the exit code lives in the upper byte.
            status: ExitStatus::from_raw(code << 8),
            stdout: vec![],
            stderr: vec![],
        }
    }

    fn set_stdout<S: AsRef<str>>(mut self, stdout: S) -> Self {
        self.stdout = stdout.as_ref().as_bytes().to_vec();
        self
    }

    fn set_stderr<S: AsRef<str>>(mut self, stderr: S) -> Self {
        self.stderr = stderr.as_ref().as_bytes().to_vec();
        self
    }
}

fn log_input(log: &Logger, id: u64, input: &Input) {
    info!(log, "running command via executor"; "id" => id, "command" => %input);
}

fn log_output(log: &Logger, id: u64, output: &Output) {
    info!(
        log,
        "finished running command via executor";
        "id" => id,
        "result" => if output.status.success() { "OK" } else { "ERROR" },
        "status" => output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "none".to_string()),
    );
    if !output.stdout.is_empty() {
        debug!(
            log,
            "finished command stdout";
            "id" => id,
            "stdout" => from_utf8(&output.stdout).unwrap_or("<Not valid UTF-8>"),
        );
    }
    if !output.stderr.is_empty() {
        debug!(
            log,
            "finished command stderr";
            "id" => id,
            "stderr" => from_utf8(&output.stderr).unwrap_or("<Not valid UTF-8>"),
        );
    }
}

/// Describes the commonly-used "safe-to-reference" type describing the
/// Executor as a trait object.
pub type BoxedExecutor = Arc<dyn Executor>;

/// Describes an "executor", which can run [Command]s and return a response.
///
/// - In production, this is usually simply a [HostExecutor].
/// - Under test, a [FakeExecutor] may be used instead.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Executes a task, waiting for it to complete, and returning output.
    async fn execute_async(
        &self,
        command: &mut tokio::process::Command,
    ) -> Result<Output, ExecutionError>;
}

pub struct HostExecutor {
    log: Logger,
    counter: AtomicU64,
}

impl HostExecutor {
    pub fn new(log: Logger) -> Arc<Self> {
        Arc::new(Self { log, counter: AtomicU64::new(0) })
    }

    pub fn as_executor(self: Arc<Self>) -> BoxedExecutor {
        self
    }
}

#[async_trait]
impl Executor for HostExecutor {
    async fn execute_async(
        &self,
        command: &mut tokio::process::Command,
    ) -> Result<Output, ExecutionError> {
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        let input = Input::from(command.as_std());
        log_input(&self.log, id, &input);

        let output = command.output().await.map_err(|err| {
            error!(self.log, "Could not start program!"; "id" => id);
            ExecutionError::ExecutionStart { command: input.to_string(), err }
        })?;
        log_output(&self.log, id, &output);

        if !output.status.success() {
            return Err(output_to_exec_error(command.as_std(), &output));
        }
        Ok(output)
    }
}

/// Handler called by a [FakeExecutor] to produce the output of a command.
pub type BoxedHandler = Box<dyn FnMut(&Input) -> Output + Send>;

struct FakeExecutorInner {
    log: Logger,
    counter: AtomicU64,
    handler: Mutex<BoxedHandler>,
}

/// An executor which can expect certain inputs, and respond with specific
/// outputs, without touching the host.
pub struct FakeExecutor {
    inner: Arc<FakeExecutorInner>,
}

impl FakeExecutor {
    pub fn new(log: Logger) -> Arc<FakeExecutor> {
        Arc::new(Self {
            inner: Arc::new(FakeExecutorInner {
                log,
                counter: AtomicU64::new(0),
                handler: Mutex::new(Box::new(|_input: &Input| {
                    Output::success()
                })),
            }),
        })
    }

    /// Set the handler to an arbitrary function.
    pub fn set_handler(&self, f: BoxedHandler) {
        *self.inner.handler.lock().unwrap() = f;
    }

    /// Perform some type coercion to access a commonly-used trait object.
    pub fn as_executor(self: Arc<Self>) -> BoxedExecutor {
        self
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    // NOTE: No async operation is actually performed here; the caller's
    // (synchronous) handler decides the output.
    async fn execute_async(
        &self,
        command: &mut tokio::process::Command,
    ) -> Result<Output, ExecutionError> {
        let id = self.inner.counter.fetch_add(1, Ordering::SeqCst);
        let input = Input::from(command.as_std());
        log_input(&self.inner.log, id, &input);

        let output = self.inner.handler.lock().unwrap()(&input);
        log_output(&self.inner.log, id, &output);

        if !output.status.success() {
            return Err(output_to_exec_error(command.as_std(), &output));
        }
        Ok(output)
    }
}

/// Handler which dynamically determines the output of a single call.
pub type DynamicHandler = Box<dyn FnMut(&Input) -> Output + Send>;

enum HandledCommand {
    Static { input: Input, output: Output },
    Dynamic { handler: DynamicHandler },
}

/// A handler that may be used for setting inputs/outputs to the executor
/// when these commands are known ahead-of-time.
///
/// See: [Self::register] for integration with a [FakeExecutor].
pub struct StaticHandler {
    expected: Vec<HandledCommand>,
    index: usize,
}

impl StaticHandler {
    pub fn new() -> Self {
        Self { expected: Vec::new(), index: 0 }
    }

    /// Convenience function to register the handler with a [FakeExecutor].
    pub fn register(mut self, executor: &FakeExecutor) {
        executor.set_handler(Box::new(move |input| self.execute(input)));
    }

    /// Expects a static "input" to exactly produce some "output".
    pub fn expect(&mut self, input: Input, output: Output) {
        self.expected.push(HandledCommand::Static { input, output });
    }

    /// A helper for [Self::expect] which quietly succeeds.
    pub fn expect_ok<S: AsRef<str>>(&mut self, input: S) {
        self.expect(Input::shell(input), Output::success())
    }

    /// A helper for [Self::expect] which quietly fails.
    pub fn expect_fail<S: AsRef<str>>(&mut self, input: S) {
        self.expect(Input::shell(input), Output::failure())
    }

    /// Expects a dynamic handler to be invoked to dynamically determine the
    /// output of this call.
    pub fn expect_dynamic(&mut self, handler: DynamicHandler) {
        self.expected.push(HandledCommand::Dynamic { handler });
    }

    fn execute(&mut self, input: &Input) -> Output {
        let expected = self
            .expected
            .get_mut(self.index)
            .unwrap_or_else(|| panic!("Unexpected command: {input}"));
        self.index += 1;

        match expected {
            HandledCommand::Static { input: expected_input, output } => {
                assert_eq!(input, expected_input, "Unexpected input command");
                output.clone()
            }
            HandledCommand::Dynamic { ref mut handler } => handler(input),
        }
    }
}

impl Default for StaticHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StaticHandler {
    fn drop(&mut self) {
        let expected = self.expected.len();
        let actual = self.index;
        if actual < expected {
            let next = &self.expected[actual];
            let tip = match next {
                HandledCommand::Static { input, .. } => input.to_string(),
                HandledCommand::Dynamic { .. } => {
                    "<dynamic handler>".to_string()
                }
            };
            let errmsg = format!(
                "Only saw {actual} calls, expected {expected}\nNext would have been: {tip}"
            );
            if !std::thread::panicking() {
                assert!(false, "{errmsg}");
            } else {
                eprintln!("{errmsg}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rabbit_test_utils::test_setup_log;

    #[tokio::test]
    async fn host_executor_reports_command_failure() {
        let logctx = test_setup_log("host_executor_reports_command_failure");
        let executor =
            HostExecutor::new(logctx.log.clone()).as_executor();

        let mut command = tokio::process::Command::new("sh");
        command.args(["-c", "echo boom >&2; exit 3"]);
        let err = executor
            .execute_async(&mut command)
            .await
            .expect_err("command should fail");
        match err {
            ExecutionError::CommandFailure(info) => {
                assert_eq!(info.status.code(), Some(3));
                assert_eq!(info.stderr, "boom\n");
            }
            other => panic!("unexpected error: {other}"),
        }

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn host_executor_reports_missing_program() {
        let logctx = test_setup_log("host_executor_reports_missing_program");
        let executor =
            HostExecutor::new(logctx.log.clone()).as_executor();

        let mut command =
            tokio::process::Command::new("/nonexistent/program");
        let err = executor
            .execute_async(&mut command)
            .await
            .expect_err("spawn should fail");
        assert!(
            matches!(err, ExecutionError::ExecutionStart { .. }),
            "unexpected error: {err}"
        );

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn static_handler_scripts_outputs_in_order() {
        let logctx = test_setup_log("static_handler_scripts_outputs_in_order");
        let executor = FakeExecutor::new(logctx.log.clone());

        let mut handler = StaticHandler::new();
        handler.expect(
            Input::shell("rabbitmqctl list_users -q"),
            Output::success().set_stdout("guest\t[administrator]\n"),
        );
        handler.expect_fail("rabbitmqctl add_vhost child_cell");
        handler.register(&executor);
        let executor = executor.as_executor();

        let mut command = tokio::process::Command::new("rabbitmqctl");
        command.args(["list_users", "-q"]);
        let output = executor
            .execute_async(&mut command)
            .await
            .expect("scripted success");
        assert_eq!(output.stdout, b"guest\t[administrator]\n");

        let mut command = tokio::process::Command::new("rabbitmqctl");
        command.args(["add_vhost", "child_cell"]);
        executor
            .execute_async(&mut command)
            .await
            .expect_err("scripted failure");

        logctx.cleanup_successful();
    }
}
