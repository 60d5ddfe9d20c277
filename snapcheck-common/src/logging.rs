//! Tracing setup shared by the binary and the test suites.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initializes logging for the command-line binary.
///
/// `RUST_LOG` wins when set; otherwise `verbose` selects debug over info.
/// With `json` every event becomes one JSON object per line, which suits
/// capturing a long suite run for later triage.
pub fn init_logging(verbose: bool, json: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

/// Installs a test-writer subscriber; later calls are no-ops.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer().with_target(true))
        .with(filter)
        .try_init();
}
