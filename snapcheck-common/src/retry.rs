//! Fixed-interval polling with a wall-clock deadline.
//!
//! Service restarts, socket binds, and endpoint readiness all converge some
//! time after the triggering command returns. Every wait in the harness is
//! the same shape: try, sleep a fixed interval, try again, give up once the
//! deadline has passed. No backoff, no jitter. The last observed fault is
//! what gets reported when the deadline runs out.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::errors::{HarnessError, HarnessResult};

// ---- Default budgets ----

/// Poll interval for service and process state.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// Deadline for service and process state.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(10);

/// Poll interval for HTTP endpoint readiness.
pub const ENDPOINT_INTERVAL: Duration = Duration::from_secs(5);

/// Deadline for HTTP endpoint readiness. Endpoints come up last, after the
/// process has bound its socket, so they get the longest budget.
pub const ENDPOINT_DEADLINE: Duration = Duration::from_secs(30);

/// A fixed-interval, deadline-bounded retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl RetryPolicy {
    pub const fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }

    /// Budget used for service, socket, and store convergence.
    pub const fn standard() -> Self {
        Self::new(DEFAULT_INTERVAL, DEFAULT_DEADLINE)
    }

    /// Budget used for HTTP endpoint readiness.
    pub const fn endpoint() -> Self {
        Self::new(ENDPOINT_INTERVAL, ENDPOINT_DEADLINE)
    }

    /// Runs `op` until it succeeds or the deadline passes.
    ///
    /// The first attempt happens immediately. After a failed attempt the
    /// policy sleeps for the full interval before trying again; once the
    /// elapsed time reaches the deadline the last error is returned wrapped
    /// in [`HarnessError::RetryExhausted`]. A zero deadline therefore means
    /// exactly one attempt.
    pub fn run<T, F>(&self, description: &str, mut op: F) -> HarnessResult<T>
    where
        F: FnMut() -> HarnessResult<T>,
    {
        let start = Instant::now();
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match op() {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(description, attempts, "condition met after retrying");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let elapsed = start.elapsed();
                    if elapsed >= self.deadline {
                        warn!(
                            description,
                            attempts,
                            ?elapsed,
                            error = %err,
                            "deadline exhausted"
                        );
                        return Err(HarnessError::RetryExhausted {
                            attempts,
                            elapsed,
                            source: Box::new(err),
                        });
                    }
                    debug!(description, attempts, error = %err, "not ready, will retry");
                    thread::sleep(self.interval);
                }
            }
        }
    }
}
