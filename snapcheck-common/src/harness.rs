//! The assembled harness: one runner, one target, all probes wired up.
//!
//! Component construction is centralized here so every layer shares the same
//! [`CommandRunner`] and the budgets configured on the target. The `await_*`
//! helpers combine point-in-time inspections with the standard retry budget;
//! they exist because a freshly restarted service races every observation the
//! harness makes.

use std::sync::Arc;

use crate::errors::{HarnessError, HarnessResult};
use crate::exec::{CommandRunner, SystemRunner};
use crate::probe::EndpointProbe;
use crate::process::ProcessInspector;
use crate::service::ServiceController;
use crate::store::ConfigStore;
use crate::target::TargetConfig;

/// Aggregates the harness components around one target service.
pub struct Harness {
    config: TargetConfig,
    runner: Arc<dyn CommandRunner>,
    store: ConfigStore,
    service: ServiceController,
    inspector: ProcessInspector,
    probe: EndpointProbe,
}

impl Harness {
    /// Harness against the live host, running privileged commands via sudo.
    pub fn new(config: TargetConfig) -> Self {
        let runner: Arc<dyn CommandRunner> =
            Arc::new(SystemRunner::privileged(config.budgets.command_timeout));
        Self::with_runner(config, runner)
    }

    /// Harness over an arbitrary runner. Tests inject a scripted one here.
    pub fn with_runner(config: TargetConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let standard = config.budgets.standard_policy();
        Self {
            store: ConfigStore::new(runner.clone(), config.snap.clone(), standard),
            service: ServiceController::new(
                runner.clone(),
                config.service(),
                config.unit(),
                standard,
            ),
            inspector: ProcessInspector::new(runner.clone()),
            probe: EndpointProbe::new(config.budgets.endpoint_policy()),
            runner,
            config,
        }
    }

    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn service(&self) -> &ServiceController {
        &self.service
    }

    pub fn inspector(&self) -> &ProcessInspector {
        &self.inspector
    }

    pub fn probe(&self) -> &EndpointProbe {
        &self.probe
    }

    /// The exporter's observed start command, all matching processes joined.
    fn start_cmd(&self) -> HarnessResult<String> {
        self.inspector
            .cmdlines_of(&self.config.process)
            .map(|lines| lines.join("\n"))
    }

    /// Polls until the process owning `bind` has `needle` in its command
    /// line. Proves the restarted service, not a leftover, took the socket.
    pub fn await_listening(&self, bind: &str, needle: &str) -> HarnessResult<()> {
        self.config.budgets.standard_policy().run("socket owner", || {
            let pid = self.inspector.pid_listening_on(bind)?;
            let cmdline = self.inspector.cmdline(pid)?.join(" ");
            if cmdline.contains(needle) {
                Ok(())
            } else {
                Err(HarnessError::AssertionFailed(format!(
                    "process {pid} on {bind} does not mention {needle}"
                )))
            }
        })
    }

    /// Polls until the start command contains every fragment.
    pub fn await_start_cmd_contains(&self, fragments: &[String]) -> HarnessResult<()> {
        self.config.budgets.standard_policy().run("start command", || {
            let cmd = self.start_cmd()?;
            match fragments.iter().find(|f| !cmd.contains(f.as_str())) {
                None => Ok(()),
                Some(missing) => Err(HarnessError::AssertionFailed(format!(
                    "start command is missing {missing}"
                ))),
            }
        })
    }

    /// Polls until the start command no longer contains `fragment`.
    pub fn await_start_cmd_lacks(&self, fragment: &str) -> HarnessResult<()> {
        self.config.budgets.standard_policy().run("start command", || {
            let cmd = self.start_cmd()?;
            if cmd.contains(fragment) {
                Err(HarnessError::AssertionFailed(format!(
                    "start command still contains {fragment}"
                )))
            } else {
                Ok(())
            }
        })
    }

    /// Polls until the start command carries exactly the given
    /// `--disable-metric=` fragments, one per disabled metric, no extras.
    pub fn await_metric_fanout(&self, fragments: &[String]) -> HarnessResult<()> {
        self.config.budgets.standard_policy().run("metric fanout", || {
            let cmd = self.start_cmd()?;
            if let Some(missing) = fragments.iter().find(|f| !cmd.contains(f.as_str())) {
                return Err(HarnessError::AssertionFailed(format!(
                    "start command is missing {missing}"
                )));
            }
            let count = cmd.matches("--disable-metric=").count();
            if count != fragments.len() {
                return Err(HarnessError::AssertionFailed(format!(
                    "expected {} --disable-metric arguments, found {count}",
                    fragments.len()
                )));
            }
            Ok(())
        })
    }

    /// Polls until the configured endpoint answers 200.
    pub fn await_endpoint(&self) -> HarnessResult<()> {
        self.probe.await_ok(&self.config.endpoint)
    }

    /// Runs the snap's exposed binary with `--help` as a smoke check that
    /// the alias is installed and executable.
    pub fn binary_help(&self) -> HarnessResult<()> {
        let alias = self.config.binary_alias();
        let out = self.runner.run(&alias, &["--help"])?;
        if out.success() {
            Ok(())
        } else {
            Err(HarnessError::CommandFailed {
                command: format!("{alias} --help"),
                detail: out.stderr.trim().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedRunner;
    use crate::testutil::fast_config;

    fn harness(runner: Arc<ScriptedRunner>) -> Harness {
        Harness::with_runner(fast_config(), runner)
    }

    const PS_QUERY: &str = "ps -C openstack-exporter -o cmd -ww";

    #[test]
    fn test_await_listening_rides_out_restart_race() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond_fail("lsof -t -i :9770", 1, "");
        runner.respond_ok("lsof -t -i :9770", "4242\n");
        runner.respond_ok(
            "cat /proc/4242/cmdline",
            "/snap/charmed-openstack-exporter/1/bin/openstack-exporter\0--web.listen-address=:9770\0",
        );

        harness(runner.clone())
            .await_listening(":9770", "charmed-openstack-exporter")
            .unwrap();
        assert_eq!(runner.call_count("lsof -t -i :9770"), 2);
    }

    #[test]
    fn test_await_listening_rejects_foreign_owner() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond_ok("lsof -t -i :9770", "17\n");
        runner.respond_ok("cat /proc/17/cmdline", "/usr/bin/something-else\0");

        let err = harness(runner)
            .await_listening(":9770", "charmed-openstack-exporter")
            .unwrap_err();
        assert!(matches!(err.root(), HarnessError::AssertionFailed(_)));
    }

    #[test]
    fn test_await_start_cmd_contains_polls_until_present() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond_ok(PS_QUERY, "CMD\n/snap/bin/exporter\n");
        runner.respond_ok(PS_QUERY, "CMD\n/snap/bin/exporter --cache\n");

        harness(runner.clone())
            .await_start_cmd_contains(&["--cache".to_string()])
            .unwrap();
        assert_eq!(runner.call_count(PS_QUERY), 2);
    }

    #[test]
    fn test_await_start_cmd_lacks_flags_stale_argument() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond_ok(PS_QUERY, "CMD\n/snap/bin/exporter --cache\n");

        let err = harness(runner)
            .await_start_cmd_lacks("--cache")
            .unwrap_err();
        assert!(matches!(err.root(), HarnessError::AssertionFailed(_)));
    }

    #[test]
    fn test_await_metric_fanout_requires_exact_count() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond_ok(
            PS_QUERY,
            "CMD\n/snap/bin/exporter --disable-metric=a --disable-metric=b --disable-metric=stale\n",
        );

        let fragments = vec![
            "--disable-metric=a".to_string(),
            "--disable-metric=b".to_string(),
        ];
        let err = harness(runner).await_metric_fanout(&fragments).unwrap_err();
        assert!(matches!(
            err.root(),
            HarnessError::AssertionFailed(msg) if msg.contains("found 3")
        ));
    }

    #[test]
    fn test_await_metric_fanout_accepts_exact_match() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond_ok(
            PS_QUERY,
            "CMD\n/snap/bin/exporter --disable-metric=a --disable-metric=b\n",
        );

        let fragments = vec![
            "--disable-metric=a".to_string(),
            "--disable-metric=b".to_string(),
        ];
        harness(runner).await_metric_fanout(&fragments).unwrap();
    }

    #[test]
    fn test_binary_help_smoke_check() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond_ok(
            "charmed-openstack-exporter.openstack-exporter --help",
            "usage: openstack-exporter",
        );
        harness(runner).binary_help().unwrap();

        let runner = Arc::new(ScriptedRunner::new());
        runner.respond_fail(
            "charmed-openstack-exporter.openstack-exporter --help",
            127,
            "command not found",
        );
        let err = harness(runner).binary_help().unwrap_err();
        assert!(matches!(err, HarnessError::CommandFailed { .. }));
    }
}
