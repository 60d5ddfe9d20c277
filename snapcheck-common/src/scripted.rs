//! Scripted command runner for tests.
//!
//! Responses are queued per rendered command line and consumed in order. The
//! final response for a command is sticky, so a polling loop that reruns the
//! same query keeps seeing the terminal state instead of draining the queue.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::errors::{HarnessError, HarnessResult};
use crate::exec::{render, CommandOutput, CommandRunner};

/// In-memory [`CommandRunner`] that replays canned responses.
#[derive(Default)]
pub struct ScriptedRunner {
    responses: Mutex<HashMap<String, VecDeque<CommandOutput>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a canned output with no duration bookkeeping.
    pub fn output(exit_code: i32, stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            duration: Duration::ZERO,
        }
    }

    /// Queues a response for the exact rendered command line.
    pub fn respond(&self, command: &str, response: CommandOutput) {
        self.responses
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry(command.to_string())
            .or_default()
            .push_back(response);
    }

    /// Queues a zero-exit response with the given stdout.
    pub fn respond_ok(&self, command: &str, stdout: &str) {
        self.respond(command, Self::output(0, stdout, ""));
    }

    /// Queues a failing response with the given exit code and stderr.
    pub fn respond_fail(&self, command: &str, exit_code: i32, stderr: &str) {
        self.respond(command, Self::output(exit_code, "", stderr));
    }

    /// Every command line this runner has been asked to execute, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// How many times the exact command line was executed.
    pub fn call_count(&self, command: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|c| c.as_str() == command)
            .count()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[&str]) -> HarnessResult<CommandOutput> {
        let rendered = render(program, args);
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(rendered.clone());

        let mut responses = self.responses.lock().unwrap_or_else(|p| p.into_inner());
        match responses.get_mut(&rendered) {
            Some(queue) if queue.len() > 1 => Ok(queue
                .pop_front()
                .unwrap_or_else(|| Self::output(0, "", ""))),
            Some(queue) => match queue.front() {
                Some(last) => Ok(last.clone()),
                None => Err(HarnessError::CommandFailed {
                    command: rendered,
                    detail: "scripted response queue is empty".to_string(),
                }),
            },
            None => Err(HarnessError::CommandFailed {
                command: rendered,
                detail: "no scripted response".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_responses_are_consumed_in_order_then_stick() {
        let runner = ScriptedRunner::new();
        runner.respond_fail("systemctl is-active --quiet u", 3, "");
        runner.respond_ok("systemctl is-active --quiet u", "");

        let first = runner
            .run("systemctl", &["is-active", "--quiet", "u"])
            .unwrap();
        assert_eq!(first.exit_code, 3);

        let second = runner
            .run("systemctl", &["is-active", "--quiet", "u"])
            .unwrap();
        assert!(second.success());

        // Last response repeats for every later call.
        let third = runner
            .run("systemctl", &["is-active", "--quiet", "u"])
            .unwrap();
        assert!(third.success());
    }

    #[test]
    fn test_unscripted_command_is_an_error() {
        let runner = ScriptedRunner::new();
        let err = runner.run("snap", &["get", "x"]).unwrap_err();
        assert!(matches!(err, HarnessError::CommandFailed { .. }));
    }

    #[test]
    fn test_calls_are_recorded_in_order() {
        let runner = ScriptedRunner::new();
        runner.respond_ok("snap get s k", "value");
        runner.respond_ok("snap unset s k", "");

        runner.run("snap", &["get", "s", "k"]).unwrap();
        runner.run("snap", &["unset", "s", "k"]).unwrap();
        runner.run("snap", &["get", "s", "k"]).unwrap();

        assert_eq!(
            runner.calls(),
            vec!["snap get s k", "snap unset s k", "snap get s k"]
        );
        assert_eq!(runner.call_count("snap get s k"), 2);
        assert_eq!(runner.call_count("snap unset s k"), 1);
    }
}
