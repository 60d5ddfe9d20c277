//! The snap configuration store.
//!
//! All mutations go through `snap set` / `snap unset`, which run the snap's
//! configure hook before committing. The hook's verdict is final: a rejected
//! key or value is reported immediately, while infrastructure failures (snapd
//! busy with another change) are retried under the standard budget. This is
//! the first of the two validation layers; flags the hook cannot check are
//! only caught later, when the service tries to start with them.

use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::{HarnessError, HarnessResult};
use crate::exec::CommandRunner;
use crate::retry::RetryPolicy;

/// Read/write access to one snap's configuration options.
pub struct ConfigStore {
    runner: Arc<dyn CommandRunner>,
    snap: String,
    policy: RetryPolicy,
}

impl ConfigStore {
    pub fn new(runner: Arc<dyn CommandRunner>, snap: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            runner,
            snap: snap.into(),
            policy,
        }
    }

    fn is_missing_key(stderr: &str, key: &str) -> bool {
        stderr.contains(&format!("has no \"{key}\" configuration option"))
    }

    /// Classifies a failed `snap set`. Only a busy snapd is worth retrying;
    /// anything else is the configure hook's verdict on the input.
    fn classify_set_failure(&self, key: &str, value: &str, stderr: &str) -> HarnessError {
        let detail = stderr.trim().to_string();
        if detail.contains("change in progress") {
            HarnessError::CommandFailed {
                command: format!("snap set {} {key}={value}", self.snap),
                detail,
            }
        } else if detail.contains("unsupported") || detail.contains("unknown") {
            HarnessError::UnknownKey {
                key: key.to_string(),
            }
        } else {
            HarnessError::RejectedValue {
                key: key.to_string(),
                value: value.to_string(),
                detail,
            }
        }
    }

    /// Current value of `key`, or `None` when the store has no value for it.
    pub fn get(&self, key: &str) -> HarnessResult<Option<String>> {
        debug!(key, "snap get");
        self.policy.run("snap get", || {
            let out = self.runner.run("snap", &["get", &self.snap, key])?;
            if out.success() {
                Ok(Some(out.stdout.trim().to_string()))
            } else if Self::is_missing_key(&out.stderr, key) {
                Ok(None)
            } else {
                Err(HarnessError::CommandFailed {
                    command: format!("snap get {} {key}", self.snap),
                    detail: out.stderr.trim().to_string(),
                })
            }
        })
    }

    /// Writes `key=value`. A hook rejection comes back as [`HarnessError::UnknownKey`]
    /// or [`HarnessError::RejectedValue`] after a single attempt; only
    /// transient snapd contention is retried.
    pub fn set(&self, key: &str, value: &str) -> HarnessResult<()> {
        info!(key, value, "snap set");
        let assignment = format!("{key}={value}");
        let verdict = self.policy.run("snap set", || {
            let out = self.runner.run("snap", &["set", &self.snap, &assignment])?;
            if out.success() {
                return Ok(None);
            }
            match self.classify_set_failure(key, value, &out.stderr) {
                transient @ HarnessError::CommandFailed { .. } => Err(transient),
                rejection => Ok(Some(rejection)),
            }
        })?;
        match verdict {
            None => Ok(()),
            Some(rejection) => Err(rejection),
        }
    }

    /// Removes any stored value for `key`. Unsetting a key that was never
    /// set succeeds, which keeps reverts idempotent.
    pub fn unset(&self, key: &str) -> HarnessResult<()> {
        info!(key, "snap unset");
        self.policy.run("snap unset", || {
            let out = self.runner.run("snap", &["unset", &self.snap, key])?;
            if out.success() {
                Ok(())
            } else {
                Err(HarnessError::CommandFailed {
                    command: format!("snap unset {} {key}", self.snap),
                    detail: out.stderr.trim().to_string(),
                })
            }
        })
    }

    /// Single-shot probe that `key` is a configuration option the snap
    /// recognizes, using the zero-exit-code convention of `snap get`.
    /// Deliberately not retried: the answer cannot change between attempts,
    /// and scenarios use it as a fail-fast guard before mutating anything.
    pub fn exists(&self, key: &str) -> HarnessResult<()> {
        let out = self.runner.run("snap", &["get", &self.snap, key])?;
        if out.success() {
            Ok(())
        } else if Self::is_missing_key(&out.stderr, key) {
            Err(HarnessError::UnknownKey {
                key: key.to_string(),
            })
        } else {
            Err(HarnessError::CommandFailed {
                command: format!("snap get {} {key}", self.snap),
                detail: out.stderr.trim().to_string(),
            })
        }
    }

    /// Puts `key` back to its pre-scenario state.
    pub fn restore(&self, key: &str, original: Option<&str>) -> HarnessResult<()> {
        match original {
            Some(value) => self.set(key, value),
            None => self.unset(key),
        }
    }
}
