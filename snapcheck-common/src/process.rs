//! Process-level observation of the target service.
//!
//! The supervisor can report a unit active while the wrong binary, or a stale
//! one, holds the socket. These probes go below the service layer: which PID
//! owns the listening socket, and what argument vector it was started with.

use std::sync::Arc;

use crate::errors::{HarnessError, HarnessResult};
use crate::exec::CommandRunner;

/// Answers PID and command-line questions about running processes.
pub struct ProcessInspector {
    runner: Arc<dyn CommandRunner>,
}

impl ProcessInspector {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// PID of the process listening on `bind`.
    ///
    /// `bind` uses `lsof -i` address syntax, e.g. `:9180` or `@localhost:9180`.
    /// When several sockets match, the first reported PID wins.
    pub fn pid_listening_on(&self, bind: &str) -> HarnessResult<u32> {
        let out = self.runner.run("lsof", &["-t", "-i", bind])?;
        if !out.success() {
            return Err(HarnessError::NotListening {
                bind: bind.to_string(),
            });
        }
        let first = out.stdout.lines().next().unwrap_or("").trim();
        if first.is_empty() {
            return Err(HarnessError::NotListening {
                bind: bind.to_string(),
            });
        }
        first.parse().map_err(|_| HarnessError::CommandFailed {
            command: format!("lsof -t -i {bind}"),
            detail: format!("expected a PID, got {first:?}"),
        })
    }

    /// Argument vector of `pid`, read from `/proc/<pid>/cmdline`.
    ///
    /// The kernel NUL-separates entries and NUL-terminates the file. Reading
    /// goes through `cat` rather than direct file IO so the scripted runner
    /// can stand in for a live host.
    pub fn cmdline(&self, pid: u32) -> HarnessResult<Vec<String>> {
        let path = format!("/proc/{pid}/cmdline");
        let out = self.runner.run("cat", &[&path])?;
        if !out.success() {
            return Err(HarnessError::ProcessNotFound(format!("pid {pid}")));
        }
        let raw = out.stdout;
        let trimmed = raw.strip_suffix('\0').unwrap_or(&raw);
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        Ok(trimmed.split('\0').map(String::from).collect())
    }

    /// Full command lines of every process whose executable name is `name`.
    pub fn cmdlines_of(&self, name: &str) -> HarnessResult<Vec<String>> {
        let out = self.runner.run("ps", &["-C", name, "-o", "cmd", "-ww"])?;
        if !out.success() {
            return Err(HarnessError::ProcessNotFound(name.to_string()));
        }
        // First line is the CMD header.
        let lines: Vec<String> = out
            .stdout
            .lines()
            .skip(1)
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        if lines.is_empty() {
            return Err(HarnessError::ProcessNotFound(name.to_string()));
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedRunner;

    fn inspector(runner: Arc<ScriptedRunner>) -> ProcessInspector {
        ProcessInspector::new(runner)
    }

    #[test]
    fn test_pid_listening_on_parses_first_line() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond_ok("lsof -t -i :9180", "4242\n4242\n");
        let pid = inspector(runner).pid_listening_on(":9180").unwrap();
        assert_eq!(pid, 4242);
    }

    #[test]
    fn test_nothing_listening_is_not_listening() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond_fail("lsof -t -i :9180", 1, "");
        let err = inspector(runner).pid_listening_on(":9180").unwrap_err();
        assert!(matches!(err, HarnessError::NotListening { bind } if bind == ":9180"));
    }

    #[test]
    fn test_empty_lsof_output_is_not_listening() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond_ok("lsof -t -i :9180", "\n");
        let err = inspector(runner).pid_listening_on(":9180").unwrap_err();
        assert!(matches!(err, HarnessError::NotListening { .. }));
    }

    #[test]
    fn test_garbage_lsof_output_is_loud() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond_ok("lsof -t -i :9180", "not-a-pid\n");
        let err = inspector(runner).pid_listening_on(":9180").unwrap_err();
        assert!(matches!(err, HarnessError::CommandFailed { .. }));
    }

    #[test]
    fn test_cmdline_splits_on_nul() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond_ok(
            "cat /proc/4242/cmdline",
            "/snap/bin/exporter\0--web.listen-address=:9180\0--cache\0",
        );
        let args = inspector(runner).cmdline(4242).unwrap();
        assert_eq!(
            args,
            vec![
                "/snap/bin/exporter",
                "--web.listen-address=:9180",
                "--cache"
            ]
        );
    }

    #[test]
    fn test_cmdline_of_missing_pid() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond_fail("cat /proc/99999/cmdline", 1, "No such file or directory");
        let err = inspector(runner).cmdline(99999).unwrap_err();
        assert!(matches!(err, HarnessError::ProcessNotFound(_)));
    }

    #[test]
    fn test_cmdlines_of_skips_ps_header() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond_ok(
            "ps -C openstack-exporter -o cmd -ww",
            "CMD\n/snap/bin/exporter --multi-cloud\n",
        );
        let lines = inspector(runner).cmdlines_of("openstack-exporter").unwrap();
        assert_eq!(lines, vec!["/snap/bin/exporter --multi-cloud"]);
    }

    #[test]
    fn test_cmdlines_of_without_match() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond_fail("ps -C openstack-exporter -o cmd -ww", 1, "");
        let err = inspector(runner)
            .cmdlines_of("openstack-exporter")
            .unwrap_err();
        assert!(matches!(err, HarnessError::ProcessNotFound(_)));
    }
}
