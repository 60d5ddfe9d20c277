//! Service lifecycle control through snapd and systemd.
//!
//! Restarts go through `snap restart` so snapd keeps its own bookkeeping
//! accurate; state queries go straight to systemd. `is_active` and
//! `is_failed` are not complements. A unit that is starting up, or cycling
//! through its restart burst, reports false for both, so callers that need a
//! settled answer must poll.

use std::sync::Arc;

use tracing::info;

use crate::errors::{HarnessError, HarnessResult};
use crate::exec::CommandRunner;
use crate::retry::RetryPolicy;

/// Restarts and observes one snap service.
pub struct ServiceController {
    runner: Arc<dyn CommandRunner>,
    service: String,
    unit: String,
    policy: RetryPolicy,
}

impl ServiceController {
    /// `service` is the snap service name used by `snap restart`
    /// (e.g. `charmed-openstack-exporter.service`); `unit` is the systemd
    /// unit it maps to (e.g. `snap.charmed-openstack-exporter.service.service`).
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        service: impl Into<String>,
        unit: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            runner,
            service: service.into(),
            unit: unit.into(),
            policy,
        }
    }

    /// Asks snapd to restart the service, retrying while snapd is busy with
    /// another change. Restart only queues the start job; follow with
    /// [`await_active`](Self::await_active) to observe the outcome.
    pub fn restart(&self) -> HarnessResult<()> {
        info!(service = %self.service, "restarting");
        self.policy.run("snap restart", || {
            let out = self.runner.run("snap", &["restart", &self.service])?;
            if out.success() {
                Ok(())
            } else {
                Err(HarnessError::RestartFailed {
                    service: self.service.clone(),
                    detail: out.stderr.trim().to_string(),
                })
            }
        })
    }

    /// Whether systemd currently reports the unit active.
    pub fn is_active(&self) -> HarnessResult<bool> {
        let out = self
            .runner
            .run("systemctl", &["is-active", "--quiet", &self.unit])?;
        Ok(out.success())
    }

    /// Whether systemd currently reports the unit failed.
    pub fn is_failed(&self) -> HarnessResult<bool> {
        let out = self
            .runner
            .run("systemctl", &["is-failed", "--quiet", &self.unit])?;
        Ok(out.success())
    }

    /// Polls until the unit is active. A unit mid restart-burst flaps
    /// between states, so a failed observation is retried rather than
    /// treated as final; only deadline exhaustion classifies the start as
    /// failed.
    pub fn await_active(&self) -> HarnessResult<()> {
        self.policy.run("service active", || {
            if self.is_active()? {
                Ok(())
            } else {
                Err(HarnessError::ServiceFailedToStart {
                    unit: self.unit.clone(),
                })
            }
        })
    }

    /// Polls until systemd reports the unit failed. Used when a start is
    /// expected to fail; exhaustion here means the service never entered
    /// the failed state, i.e. the bad input was accepted.
    pub fn await_failed(&self) -> HarnessResult<()> {
        self.policy.run("service failed", || {
            if self.is_failed()? {
                Ok(())
            } else {
                Err(HarnessError::AssertionFailed(format!(
                    "{} has not entered failed state",
                    self.unit
                )))
            }
        })
    }
}
