//! Fault taxonomy for harness operations.
//!
//! Store-level refusals (`UnknownKey`, `RejectedValue`) are kept distinct
//! from start-time failures (`ServiceFailedToStart`): the same bad input can
//! be rejected at either layer depending on the key. `RetryExhausted` wraps
//! whatever fault was last observed when a polling deadline ran out, and
//! `RevertFailed` marks the one condition that must halt a run outright.

use std::time::Duration;

/// Error type for harness operations.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("unknown config key: {key}")]
    UnknownKey { key: String },

    #[error("store rejected {key}={value}: {detail}")]
    RejectedValue {
        key: String,
        value: String,
        detail: String,
    },

    #[error("{unit} failed to start")]
    ServiceFailedToStart { unit: String },

    #[error("nothing is listening on {bind}")]
    NotListening { bind: String },

    #[error("process not found: {0}")]
    ProcessNotFound(String),

    #[error("endpoint unreachable: {url}: {detail}")]
    EndpointUnreachable { url: String, detail: String },

    #[error("endpoint {url} answered {status}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("supervisor refused to restart {service}: {detail}")]
    RestartFailed { service: String, detail: String },

    #[error("gave up after {attempts} attempts over {elapsed:?}: {source}")]
    RetryExhausted {
        attempts: u32,
        elapsed: Duration,
        #[source]
        source: Box<HarnessError>,
    },

    #[error("revert failed, service state can no longer be trusted: {source}")]
    RevertFailed {
        #[source]
        source: Box<HarnessError>,
    },

    #[error("command failed: {command}: {detail}")]
    CommandFailed { command: String, detail: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    #[error("setup failed: {0}")]
    SetupFailed(String),

    #[error("cleanup failed: {0}")]
    CleanupFailed(String),
}

/// Result type for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

impl HarnessError {
    /// The innermost fault once retry and revert wrappers are peeled off.
    pub fn root(&self) -> &HarnessError {
        match self {
            HarnessError::RetryExhausted { source, .. } => source.root(),
            HarnessError::RevertFailed { source } => source.root(),
            _ => self,
        }
    }

    /// Whether this is the deadline wrapper rather than a direct fault.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, HarnessError::RetryExhausted { .. })
    }
}
