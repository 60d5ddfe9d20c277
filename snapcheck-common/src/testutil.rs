//! Shared fixtures for unit tests.

use std::sync::Arc;
use std::time::Duration;

use crate::harness::Harness;
use crate::scripted::ScriptedRunner;
use crate::target::{Budgets, TargetConfig};

/// Millisecond-scale budgets so polling paths converge or exhaust quickly.
pub(crate) fn fast_budgets() -> Budgets {
    Budgets {
        command_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(1),
        poll_deadline: Duration::from_millis(50),
        endpoint_interval: Duration::from_millis(1),
        endpoint_deadline: Duration::from_millis(50),
    }
}

/// Default target names with [`fast_budgets`].
pub(crate) fn fast_config() -> TargetConfig {
    TargetConfig {
        budgets: fast_budgets(),
        ..TargetConfig::default()
    }
}

/// A harness wired to a fresh scripted runner.
pub(crate) fn scripted_harness() -> (Arc<ScriptedRunner>, Harness) {
    let runner = Arc::new(ScriptedRunner::new());
    let harness = Harness::with_runner(fast_config(), runner.clone());
    (runner, harness)
}
