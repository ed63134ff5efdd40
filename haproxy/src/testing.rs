//! Test doubles

use common::{CommandError, CommandOutput, ShellRunner};
use std::collections::HashMap;
use std::future::{self, Future};
use std::sync::Mutex;
use std::time::Duration;

/// Successful output with the given stdout.
pub fn ok(stdout: impl Into<String>) -> CommandOutput {
    CommandOutput {
        stdout: stdout.into(),
        stderr: String::new(),
        success: true,
        code: Some(0),
    }
}

/// Failed output with the given exit code and stderr.
pub fn failed(code: i32, stderr: impl Into<String>) -> CommandOutput {
    CommandOutput {
        stdout: String::new(),
        stderr: stderr.into(),
        success: false,
        code: Some(code),
    }
}

#[derive(Clone)]
enum Response {
    Output(CommandOutput),
    Timeout,
}

/// Shell runner that answers from a table and records every call.
///
/// Unknown commands behave like `sh` reporting "not found" (exit 127).
#[derive(Default)]
pub struct StubShell {
    responses: Mutex<HashMap<String, Response>>,
    calls: Mutex<Vec<String>>,
}

impl StubShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, command: &str, output: CommandOutput) -> Self {
        self.set(command, output);
        self
    }

    pub fn time_out(self, command: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(command.to_string(), Response::Timeout);
        self
    }

    /// Replace the answer for `command` between calls.
    pub fn set(&self, command: &str, output: CommandOutput) {
        self.responses
            .lock()
            .unwrap()
            .insert(command.to_string(), Response::Output(output));
    }

    pub fn calls_to(&self, command: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == command)
            .count()
    }
}

impl ShellRunner for StubShell {
    fn run_shell(
        &self,
        command: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<CommandOutput, CommandError>> + Send {
        self.calls.lock().unwrap().push(command.to_string());

        let result = match self.responses.lock().unwrap().get(command).cloned() {
            Some(Response::Output(output)) => Ok(output),
            Some(Response::Timeout) => Err(CommandError::Timeout {
                command: command.to_string(),
                timeout,
            }),
            None => Ok(failed(127, format!("sh: {}: not found", command))),
        };

        future::ready(result)
    }
}
