//! Core library of the snapcheck harness.
//!
//! snapcheck verifies that a snap-packaged service honours its configuration
//! surface: every supported key, once set, must survive a restart and show up
//! in the relaunched process, and every unsupported or malformed value must
//! be refused or drive the service into a visible failed state. The harness
//! talks to the machine exclusively through external commands (`snap`,
//! `systemctl`, `lsof`, `ps`, `cat`) behind the [`CommandRunner`] seam, which
//! is what makes the whole transaction logic testable without a snapd.
//!
//! The layers, bottom up:
//!
//! - [`exec`] runs commands with a hard timeout; [`scripted`] is the
//!   in-memory stand-in used by tests.
//! - [`retry`] turns eventually-consistent observations into bounded polls.
//! - [`store`], [`service`], [`process`] and [`probe`] adapt the snap
//!   configuration store, the systemd unit, the process table and the HTTP
//!   endpoint.
//! - [`scenario`] is the set/restart/verify/revert transaction, [`suite`]
//!   the schema-derived inventory of those transactions, and [`session`]
//!   the install/remove lifecycle around a run.

pub mod errors;
pub mod exec;
pub mod harness;
pub mod logging;
pub mod probe;
pub mod process;
pub mod retry;
pub mod scenario;
pub mod schema;
pub mod scripted;
pub mod service;
pub mod session;
pub mod store;
pub mod suite;
pub mod target;

#[cfg(test)]
pub(crate) mod testutil;

pub use errors::{HarnessError, HarnessResult};
pub use exec::{CommandOutput, CommandRunner, SystemRunner};
pub use harness::Harness;
pub use logging::{init_logging, init_test_logging};
pub use probe::EndpointProbe;
pub use process::ProcessInspector;
pub use retry::RetryPolicy;
pub use scenario::{ConfigScenario, Phase, ScenarioReport};
pub use schema::{KeyKind, KeySpec};
pub use scripted::ScriptedRunner;
pub use service::ServiceController;
pub use session::SessionManager;
pub use store::ConfigStore;
pub use suite::{Case, CaseKind, CaseOutcome, ScenarioSuite, SuiteReport};
pub use target::{Budgets, TargetConfig};
