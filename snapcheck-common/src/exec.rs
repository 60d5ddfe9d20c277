//! Subprocess execution with hard timeouts.
//!
//! Everything the harness does to the system under test goes through the
//! [`CommandRunner`] trait, which keeps the higher layers testable against a
//! scripted runner. The real implementation shells out with a kill-on-deadline
//! wrapper so a wedged `snap` or `systemctl` invocation cannot stall a run.

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::errors::{HarnessError, HarnessResult};

// ---- Execution constants ----

/// Exit code reported when a command is killed at its deadline.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Default per-command deadline.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 60;

/// Poll interval while waiting for a child to exit.
const WAIT_POLL: Duration = Duration::from_millis(10);

/// Programs that must run as the invoking user even when the runner is
/// privileged. `/proc/<pid>/cmdline` and `ps` are world-readable, and running
/// them through sudo would mask permission bugs in the harness itself.
const UNPRIVILEGED: &[&str] = &["ps", "cat"];

/// Captured result of one command invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_contains(&self, needle: &str) -> bool {
        self.stdout.contains(needle)
    }

    pub fn stderr_contains(&self, needle: &str) -> bool {
        self.stderr.contains(needle)
    }
}

/// Seam between the harness and the host system.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&str]) -> HarnessResult<CommandOutput>;
}

/// Renders a command line for logs and error messages.
pub fn render(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

fn needs_sudo(program: &str) -> bool {
    !UNPRIVILEGED.contains(&program)
}

/// Runs commands against the live host.
pub struct SystemRunner {
    timeout: Duration,
    sudo: bool,
}

impl SystemRunner {
    /// Runner that executes commands as the invoking user.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            sudo: false,
        }
    }

    /// Runner that prefixes privileged commands with `sudo -n`. Process
    /// inspection commands stay unprivileged, see [`UNPRIVILEGED`].
    pub fn privileged(timeout: Duration) -> Self {
        Self {
            timeout,
            sudo: true,
        }
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS))
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> HarnessResult<CommandOutput> {
        if self.sudo && needs_sudo(program) {
            let mut sudo_args: Vec<&str> = Vec::with_capacity(args.len() + 2);
            sudo_args.push("-n");
            sudo_args.push(program);
            sudo_args.extend_from_slice(args);
            exec_with_timeout("sudo", &sudo_args, self.timeout)
        } else {
            exec_with_timeout(program, args, self.timeout)
        }
    }
}

/// Spawns `program` with `args`, captures both output streams, and kills the
/// child if it is still running at the deadline. A killed child reports
/// [`TIMEOUT_EXIT_CODE`]; a signal-terminated child reports -1.
pub fn exec_with_timeout(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> HarnessResult<CommandOutput> {
    let rendered = render(program, args);
    debug!(command = %rendered, "exec");
    let start = Instant::now();

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| HarnessError::CommandFailed {
            command: rendered.clone(),
            detail: format!("spawn failed: {e}"),
        })?;

    let stdout_handle = child.stdout.take().map(|mut out| {
        thread::spawn(move || {
            let mut buf = String::new();
            let _ = out.read_to_string(&mut buf);
            buf
        })
    });
    let stderr_handle = child.stderr.take().map(|mut err| {
        thread::spawn(move || {
            let mut buf = String::new();
            let _ = err.read_to_string(&mut buf);
            buf
        })
    });

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    break None;
                }
                thread::sleep(WAIT_POLL);
            }
            Err(err) => {
                // A failed wait does not mean the child exited; reap it
                // before surfacing the error.
                let _ = child.kill();
                let _ = child.wait();
                return Err(err.into());
            }
        }
    };

    let stdout = stdout_handle
        .map(|h| h.join().unwrap_or_default())
        .unwrap_or_default();
    let stderr = stderr_handle
        .map(|h| h.join().unwrap_or_default())
        .unwrap_or_default();

    let exit_code = match status {
        Some(status) => status.code().unwrap_or(-1),
        None => TIMEOUT_EXIT_CODE,
    };
    let duration = start.elapsed();
    debug!(command = %rendered, exit_code, ?duration, "exec done");

    Ok(CommandOutput {
        exit_code,
        stdout,
        stderr,
        duration,
    })
}
