//! One configuration transaction: mutate, restart, verify, always revert.
//!
//! The revert is the harness's central correctness property. Whatever happens
//! after the key has been confirmed to exist, the scenario puts the captured
//! original value back, restarts, and waits for the service to come up again,
//! so no scenario can leak a misconfigured service into the next one. The only
//! failure that escapes this guarantee is the revert itself, and that one is
//! promoted to [`HarnessError::RevertFailed`] and outranks everything else.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::{HarnessError, HarnessResult};
use crate::harness::Harness;

/// Phase of a scenario in which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Confirming the key exists and capturing its original value.
    Probe,
    /// Writing the new value into the store.
    Mutate,
    /// Asking the supervisor to restart the service.
    Restart,
    /// The caller's convergence assertions.
    Verify,
    /// Restoring the original value and re-activating the service.
    Revert,
}

/// Record of one executed scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub key: String,
    pub value: String,
    /// Stored value before mutation; `None` when the key held nothing.
    pub original: Option<String>,
    pub passed: bool,
    pub failed_phase: Option<Phase>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// A single set-restart-verify-revert transaction against the harness.
///
/// Consumed by [`run`](Self::run), so each context mutates and reverts
/// exactly once.
pub struct ConfigScenario<'h> {
    harness: &'h Harness,
    key: String,
    value: String,
}

impl<'h> ConfigScenario<'h> {
    pub fn new(harness: &'h Harness, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            harness,
            key: key.into(),
            value: value.into(),
        }
    }

    /// Runs the transaction, yielding to `verify` between restart and revert.
    pub fn run<T, F>(self, verify: F) -> HarnessResult<T>
    where
        F: FnOnce(&Harness) -> HarnessResult<T>,
    {
        self.run_reported(verify).0
    }

    /// Like [`run`](Self::run), but also returns the execution record.
    pub fn run_reported<T, F>(self, verify: F) -> (HarnessResult<T>, ScenarioReport)
    where
        F: FnOnce(&Harness) -> HarnessResult<T>,
    {
        let started_at = Utc::now();
        let start = Instant::now();
        info!(key = %self.key, value = %self.value, "scenario start");

        let store = self.harness.store();
        let service = self.harness.service();

        // An unknown key aborts before anything is mutated; with no write
        // landed there is nothing to revert.
        let original = match store.exists(&self.key).and_then(|()| store.get(&self.key)) {
            Ok(original) => original,
            Err(err) => {
                return self.finish(Err(err), None, Some(Phase::Probe), started_at, start);
            }
        };
        debug!(key = %self.key, original = original.as_deref().unwrap_or("<unset>"), "captured");

        // From here on the revert runs no matter which phase gives up.
        let body: Result<T, (Phase, HarnessError)> = store
            .set(&self.key, &self.value)
            .map_err(|e| (Phase::Mutate, e))
            .and_then(|()| service.restart().map_err(|e| (Phase::Restart, e)))
            .and_then(|()| verify(self.harness).map_err(|e| (Phase::Verify, e)));

        let reverted = self.revert(original.as_deref());

        match (body, reverted) {
            (Ok(value), Ok(())) => self.finish(Ok(value), original, None, started_at, start),
            (Err((phase, err)), Ok(())) => {
                self.finish(Err(err), original, Some(phase), started_at, start)
            }
            (body, Err(revert_err)) => {
                // A pass or an ordinary failure is eclipsed either way: with
                // the baseline not restored, later scenarios cannot be trusted.
                if let Err((phase, err)) = &body {
                    warn!(
                        key = %self.key,
                        ?phase,
                        error = %err,
                        "scenario failure eclipsed by revert failure"
                    );
                }
                let fatal = HarnessError::RevertFailed {
                    source: Box::new(revert_err),
                };
                self.finish(Err(fatal), original, Some(Phase::Revert), started_at, start)
            }
        }
    }

    /// Restores the captured value, restarts, and confirms the service is
    /// active again.
    fn revert(&self, original: Option<&str>) -> HarnessResult<()> {
        info!(key = %self.key, "reverting");
        let store = self.harness.store();
        let service = self.harness.service();
        store.restore(&self.key, original)?;
        service.restart()?;
        service.await_active()
    }

    fn finish<T>(
        self,
        result: HarnessResult<T>,
        original: Option<String>,
        failed_phase: Option<Phase>,
        started_at: DateTime<Utc>,
        start: Instant,
    ) -> (HarnessResult<T>, ScenarioReport) {
        let report = ScenarioReport {
            key: self.key,
            value: self.value,
            original,
            passed: result.is_ok(),
            failed_phase,
            error: result.as_ref().err().map(ToString::to_string),
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        if report.passed {
            info!(key = %report.key, duration_ms = report.duration_ms, "scenario passed");
        } else {
            warn!(
                key = %report.key,
                ?failed_phase,
                error = report.error.as_deref().unwrap_or(""),
                "scenario failed"
            );
        }
        (result, report)
    }
}
