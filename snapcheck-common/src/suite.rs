//! The built-in scenario inventory and its sequential runner.
//!
//! Every case is derived from the key schema: three per boolean flag
//! (enable, disable, rejected value), one per value key plus one more where
//! an invalid value is known to break startup, the bind change, the cloud
//! positional, and the metric fan-out. Cases run strictly one after another
//! because they all mutate the same running service; there is nothing to
//! parallelize without a second service instance.
//!
//! A revert failure halts the whole run. Once a scenario cannot restore the
//! baseline, every later verdict would be taken against an untrusted service.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::errors::{HarnessError, HarnessResult};
use crate::harness::Harness;
use crate::scenario::{ConfigScenario, Phase, ScenarioReport};
use crate::schema::{self, KeyKind, KeySpec};

/// Value used to provoke a store-level rejection on boolean flags.
const REJECTED_FLAG_VALUE: &str = "test";

/// Key that must not exist in any exporter schema.
const UNKNOWN_KEY: &str = "nonexistent-option";

/// What a case does once it runs.
#[derive(Debug, Clone, Copy)]
pub enum CaseKind {
    /// The exposed binary answers `--help`.
    BinaryHelp,
    /// The service is active and its endpoint answers 200.
    ServiceHealth,
    /// Setting the flag to `true` puts `--<key>` on the command line.
    EnableFlag(&'static KeySpec),
    /// Setting the flag to `false` keeps `--<key>` off the command line.
    DisableFlag(&'static KeySpec),
    /// The store refuses the value outright; no restart is ever attempted.
    RejectValue {
        spec: &'static KeySpec,
        value: &'static str,
    },
    /// Reading a key outside the schema fails with a non-zero exit.
    UnknownKey { key: &'static str },
    /// A valid value appears on the command line after restart.
    ValidValue(&'static KeySpec),
    /// A stored-but-invalid value drives the service into the failed state.
    StartFailure {
        spec: &'static KeySpec,
        value: &'static str,
    },
    /// A new bind address is picked up and owned by the exporter process.
    BindChange(&'static KeySpec),
    /// A metric list fans out into one `--disable-metric=` per token.
    MetricFanout(&'static KeySpec),
}

/// One runnable case of the suite.
#[derive(Debug, Clone)]
pub struct Case {
    pub id: String,
    pub kind: CaseKind,
}

impl Case {
    fn new(id: impl Into<String>, kind: CaseKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

/// The full built-in inventory, in execution order.
pub fn plan() -> Vec<Case> {
    let mut cases = vec![
        Case::new("binary", CaseKind::BinaryHelp),
        Case::new("service-health", CaseKind::ServiceHealth),
        Case::new("unknown-key", CaseKind::UnknownKey { key: UNKNOWN_KEY }),
    ];
    for spec in schema::KEYS {
        match spec.kind {
            KeyKind::Flag => {
                cases.push(Case::new(
                    format!("enable-{}", spec.name),
                    CaseKind::EnableFlag(spec),
                ));
                cases.push(Case::new(
                    format!("disable-{}", spec.name),
                    CaseKind::DisableFlag(spec),
                ));
                cases.push(Case::new(
                    format!("reject-{}", spec.name),
                    CaseKind::RejectValue {
                        spec,
                        value: REJECTED_FLAG_VALUE,
                    },
                ));
            }
            KeyKind::Value | KeyKind::Positional => {
                cases.push(Case::new(
                    format!("value-{}", spec.name),
                    CaseKind::ValidValue(spec),
                ));
                if let Some(bad) = spec.invalid {
                    cases.push(Case::new(
                        format!("invalid-{}", spec.name),
                        CaseKind::StartFailure { spec, value: bad },
                    ));
                }
            }
            KeyKind::Bind => {
                cases.push(Case::new("bind-valid", CaseKind::BindChange(spec)));
                if let Some(bad) = spec.invalid {
                    cases.push(Case::new(
                        "bind-invalid",
                        CaseKind::StartFailure { spec, value: bad },
                    ));
                }
            }
            KeyKind::MetricList => {
                cases.push(Case::new("metrics-fanout", CaseKind::MetricFanout(spec)));
            }
        }
    }
    cases
}

/// Outcome of a single case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseOutcome {
    pub id: String,
    pub passed: bool,
    pub failed_phase: Option<Phase>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Aggregated result of a suite run.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// True when a revert failure stopped the run before all cases executed.
    pub halted: bool,
    pub outcomes: Vec<CaseOutcome>,
}

impl SuiteReport {
    pub fn all_passed(&self) -> bool {
        !self.halted && self.failed == 0 && self.passed == self.total
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Runs suite cases against one harness, sequentially.
pub struct ScenarioSuite<'h> {
    harness: &'h Harness,
    cases: Vec<Case>,
}

impl<'h> ScenarioSuite<'h> {
    /// The complete built-in plan.
    pub fn new(harness: &'h Harness) -> Self {
        Self::with_cases(harness, plan())
    }

    /// Only the cases whose id contains `filter`.
    pub fn filtered(harness: &'h Harness, filter: &str) -> Self {
        let cases = plan()
            .into_iter()
            .filter(|case| case.id.contains(filter))
            .collect();
        Self::with_cases(harness, cases)
    }

    fn with_cases(harness: &'h Harness, cases: Vec<Case>) -> Self {
        Self { harness, cases }
    }

    pub fn case_ids(&self) -> Vec<&str> {
        self.cases.iter().map(|case| case.id.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn run(&self) -> SuiteReport {
        let started_at = Utc::now();
        let total = self.cases.len();
        info!(total, "suite start");

        let mut outcomes: Vec<CaseOutcome> = Vec::with_capacity(total);
        let mut halted = false;
        for case in &self.cases {
            let outcome = self.run_case(case);
            let fatal = outcome.failed_phase == Some(Phase::Revert);
            outcomes.push(outcome);
            if fatal {
                error!(
                    id = %case.id,
                    "revert failed, baseline lost, aborting the remaining cases"
                );
                halted = true;
                break;
            }
        }

        let passed = outcomes.iter().filter(|o| o.passed).count();
        let failed = outcomes.len() - passed;
        let report = SuiteReport {
            started_at,
            finished_at: Utc::now(),
            total,
            passed,
            failed,
            halted,
            outcomes,
        };
        info!(
            total = report.total,
            passed = report.passed,
            failed = report.failed,
            halted = report.halted,
            "suite done"
        );
        report
    }

    fn run_case(&self, case: &Case) -> CaseOutcome {
        info!(id = %case.id, "case start");
        let start = Instant::now();
        let (result, report) = self.execute(&case.kind);
        let failed_phase = report.as_ref().and_then(|r| r.failed_phase);
        let outcome = CaseOutcome {
            id: case.id.clone(),
            passed: result.is_ok(),
            failed_phase,
            error: result.err().map(|e| e.to_string()),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        if outcome.passed {
            info!(id = %outcome.id, duration_ms = outcome.duration_ms, "case passed");
        } else {
            warn!(
                id = %outcome.id,
                error = outcome.error.as_deref().unwrap_or(""),
                "case failed"
            );
        }
        outcome
    }

    fn execute(&self, kind: &CaseKind) -> (HarnessResult<()>, Option<ScenarioReport>) {
        match kind {
            CaseKind::BinaryHelp => (self.harness.binary_help(), None),
            CaseKind::ServiceHealth => {
                let result = self
                    .harness
                    .service()
                    .await_active()
                    .and_then(|()| self.harness.await_endpoint());
                (result, None)
            }
            CaseKind::RejectValue { spec, value } => (self.reject_value(spec, value), None),
            CaseKind::UnknownKey { key } => (self.unknown_key(key), None),
            CaseKind::EnableFlag(spec) => {
                let fragments = spec.fragments("true");
                self.scenario(spec.name, "true", move |h| {
                    h.service().await_active()?;
                    h.await_start_cmd_contains(&fragments)
                })
            }
            CaseKind::DisableFlag(spec) => {
                let flag = format!("--{}", spec.name);
                self.scenario(spec.name, "false", move |h| {
                    h.service().await_active()?;
                    h.await_start_cmd_lacks(&flag)
                })
            }
            CaseKind::ValidValue(spec) => {
                let fragments = spec.fragments(spec.valid);
                self.scenario(spec.name, spec.valid, move |h| {
                    h.service().await_active()?;
                    h.await_start_cmd_contains(&fragments)
                })
            }
            CaseKind::StartFailure { spec, value } => {
                self.scenario(spec.name, value, |h| h.service().await_failed())
            }
            CaseKind::BindChange(spec) => {
                let bind = spec.valid.to_string();
                self.scenario(spec.name, spec.valid, move |h| {
                    h.await_listening(&bind, &h.config().snap)
                })
            }
            CaseKind::MetricFanout(spec) => {
                let fragments = spec.fragments(spec.valid);
                self.scenario(spec.name, spec.valid, move |h| {
                    h.service().await_active()?;
                    h.await_metric_fanout(&fragments)
                })
            }
        }
    }

    fn scenario<F>(&self, key: &str, value: &str, verify: F) -> (HarnessResult<()>, Option<ScenarioReport>)
    where
        F: FnOnce(&Harness) -> HarnessResult<()>,
    {
        let (result, report) = ConfigScenario::new(self.harness, key, value).run_reported(verify);
        (result, Some(report))
    }

    /// A key outside the schema must fail the existence probe before any
    /// mutation could happen.
    fn unknown_key(&self, key: &str) -> HarnessResult<()> {
        match self.harness.store().exists(key) {
            Err(HarnessError::UnknownKey { .. }) => Ok(()),
            Err(other) => Err(other),
            Ok(()) => Err(HarnessError::AssertionFailed(format!(
                "store reports unknown key {key} as existing"
            ))),
        }
    }

    /// The store must refuse the write on its own; a restart never happens.
    /// If the value lands anyway, it is unset again immediately so the
    /// polluted key cannot break a later scenario's restart.
    fn reject_value(&self, spec: &KeySpec, value: &str) -> HarnessResult<()> {
        match self.harness.store().set(spec.name, value) {
            Err(HarnessError::RejectedValue { .. } | HarnessError::UnknownKey { .. }) => Ok(()),
            Err(other) => Err(other),
            Ok(()) => {
                warn!(key = spec.name, value, "store accepted a value it should refuse");
                if let Err(err) = self.harness.store().unset(spec.name) {
                    warn!(key = spec.name, error = %err, "cleanup unset failed");
                }
                Err(HarnessError::AssertionFailed(format!(
                    "store accepted {}={value}",
                    spec.name
                )))
            }
        }
    }
}
