//! A scripted command runner for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::runner::{CommandOutput, CommandRunner, CommandSpec};
use crate::error::{OrchestratorError, Result};

/// A canned result replayed by [`ScriptedRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedResponse {
    /// The command succeeds with the given stdout.
    Success(String),

    /// The command exits with a non-zero code and the given output.
    Failure {
        /// Exit code to report.
        exit_code: i32,
        /// Combined output to report.
        output: String,
    },
}

impl ScriptedResponse {
    /// A successful response with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self::Success(stdout.into())
    }

    /// A failing response with exit code 1.
    pub fn failure(output: impl Into<String>) -> Self {
        Self::Failure {
            exit_code: 1,
            output: output.into(),
        }
    }
}

/// Records every command and replays queued responses in order.
///
/// Once the queue is empty every command succeeds with empty output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    calls: Mutex<Vec<CommandSpec>>,
    responses: Mutex<VecDeque<ScriptedResponse>>,
}

impl ScriptedRunner {
    /// Creates a runner with no queued responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a runner with the given queued responses.
    pub fn with_responses(responses: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            responses: Mutex::new(responses.into_iter().collect()),
        }
    }

    /// Returns every command seen so far.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Returns every command seen so far, rendered as command lines.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(ToString::to_string).collect()
    }

    fn record(&self, command: &CommandSpec) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command.clone());
        }
    }

    fn next_response(&self) -> Option<ScriptedResponse> {
        self.responses.lock().ok().and_then(|mut r| r.pop_front())
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run_once(&self, command: &CommandSpec) -> Result<CommandOutput> {
        self.record(command);
        match self.next_response() {
            None => Ok(CommandOutput::default()),
            Some(ScriptedResponse::Success(stdout)) => Ok(CommandOutput::new(stdout, "", 0)),
            Some(ScriptedResponse::Failure { exit_code, output }) => Err(
                OrchestratorError::execution(
                    command.to_string(),
                    format!("exit status: {}", exit_code),
                    output,
                ),
            ),
        }
    }

    async fn spawn_detached(&self, command: &CommandSpec) -> Result<Option<u32>> {
        self.record(command);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::command::RetryPolicy;

    #[tokio::test]
    async fn test_scripted_runner_records_calls() {
        let runner = ScriptedRunner::new();
        let cmd = CommandSpec::new("kill").args(["-0", "42"]);

        runner.run(&cmd, RetryPolicy::Never).await.unwrap();
        runner.spawn_detached(&cmd).await.unwrap();

        assert_eq!(runner.command_lines(), vec!["kill -0 42", "kill -0 42"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_fails_on_first_attempt() {
        let runner = ScriptedRunner::with_responses([ScriptedResponse::failure("nope")]);
        let cmd = CommandSpec::new("false");

        let start = tokio::time::Instant::now();
        let err = runner.run(&cmd, RetryPolicy::Never).await.unwrap_err();
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(err.output(), Some("nope"));
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_retries_until_success() {
        let runner = ScriptedRunner::with_responses([
            ScriptedResponse::failure("down"),
            ScriptedResponse::failure("still down"),
            ScriptedResponse::success("ok"),
        ]);
        let cmd = CommandSpec::new("psql");

        let start = tokio::time::Instant::now();
        let output = runner
            .run(&cmd, RetryPolicy::Every(Duration::from_secs(3)))
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(6));
        assert_eq!(output.stdout, "ok");
        assert_eq!(runner.calls().len(), 3);
    }
}
