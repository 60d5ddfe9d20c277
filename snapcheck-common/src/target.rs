//! Target selection and retry budgets.
//!
//! The harness is built for the charmed-openstack-exporter snap but every
//! name it touches (snap, process, endpoint, config dir) and every timing
//! budget can be overridden. Overrides layer: a `snapcheck.toml` file (or
//! the file named by `SNAPCHECK_CONFIG`) first, `SNAPCHECK_`-prefixed
//! environment variables on top. Parsing collects all problems before
//! reporting so a botched setup fails with one complete message instead of
//! one field at a time.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::errors::{HarnessError, HarnessResult};
use crate::exec::DEFAULT_COMMAND_TIMEOUT_SECS;
use crate::retry::{self, RetryPolicy};

// ---- Target defaults ----

pub const DEFAULT_SNAP: &str = "charmed-openstack-exporter";
pub const DEFAULT_PROCESS: &str = "openstack-exporter";
pub const DEFAULT_ENDPOINT: &str = "http://localhost:9180";
pub const DEFAULT_CONFIG_DIR: &str = "/etc/openstack";
pub const DEFAULT_INTERFACE: &str = "etc-openstack";

const ENV_PREFIX: &str = "SNAPCHECK_";
const DEFAULT_CONFIG_FILE: &str = "snapcheck.toml";

fn expand_home(value: &str) -> PathBuf {
    if let Some(stripped) = value.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(value)
}

/// Errors that can occur while reading the environment.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("invalid duration for {var}: '{value}'")]
    InvalidDuration { var: String, value: String },
}

/// Environment variable parser that accumulates errors.
struct EnvParser {
    errors: Vec<EnvError>,
}

impl EnvParser {
    fn new() -> Self {
        Self { errors: Vec::new() }
    }

    fn var_name(&self, name: &str) -> String {
        format!("{ENV_PREFIX}{name}")
    }

    fn get_string(&mut self, name: &str, default: &str) -> String {
        env::var(self.var_name(name)).unwrap_or_else(|_| default.to_string())
    }

    /// Path value with `~/` expansion.
    fn get_path(&mut self, name: &str, default: &str) -> PathBuf {
        expand_home(&self.get_string(name, default))
    }

    /// Duration in humantime notation (`2s`, `500ms`, `1m`).
    fn get_duration(&mut self, name: &str, default: Duration) -> Duration {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => match humantime::parse_duration(&value) {
                Ok(parsed) => parsed,
                Err(_) => {
                    self.errors.push(EnvError::InvalidDuration {
                        var: var_name,
                        value,
                    });
                    default
                }
            },
            Err(_) => default,
        }
    }

    fn finish(self) -> HarnessResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            let joined = self
                .errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            Err(HarnessError::SetupFailed(joined))
        }
    }
}

/// Timing budgets for every wait in the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budgets {
    pub command_timeout: Duration,
    pub poll_interval: Duration,
    pub poll_deadline: Duration,
    pub endpoint_interval: Duration,
    pub endpoint_deadline: Duration,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            poll_interval: retry::DEFAULT_INTERVAL,
            poll_deadline: retry::DEFAULT_DEADLINE,
            endpoint_interval: retry::ENDPOINT_INTERVAL,
            endpoint_deadline: retry::ENDPOINT_DEADLINE,
        }
    }
}

impl Budgets {
    /// Policy for service, socket, and store convergence.
    pub fn standard_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.poll_interval, self.poll_deadline)
    }

    /// Policy for HTTP endpoint readiness.
    pub fn endpoint_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.endpoint_interval, self.endpoint_deadline)
    }
}

/// Everything the harness needs to know about the system under test.
#[derive(Debug, Clone)]
pub struct TargetConfig {
    /// Snap package name.
    pub snap: String,
    /// Executable name of the exporter process.
    pub process: String,
    /// Root URL the exporter serves on.
    pub endpoint: String,
    /// Directory the snap reads cloud credentials from.
    pub config_dir: PathBuf,
    /// Content interface granting the snap access to `config_dir`.
    pub interface: String,
    pub budgets: Budgets,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            snap: DEFAULT_SNAP.to_string(),
            process: DEFAULT_PROCESS.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
            interface: DEFAULT_INTERFACE.to_string(),
            budgets: Budgets::default(),
        }
    }
}

/// On-disk form of [`TargetConfig`]. Every field is optional; durations use
/// humantime notation (`2s`, `500ms`, `1m`).
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TargetFile {
    snap: Option<String>,
    process: Option<String>,
    endpoint: Option<String>,
    config_dir: Option<String>,
    interface: Option<String>,
    command_timeout: Option<String>,
    poll_interval: Option<String>,
    poll_deadline: Option<String>,
    endpoint_interval: Option<String>,
    endpoint_deadline: Option<String>,
}

fn file_duration(
    errors: &mut Vec<String>,
    field: &str,
    value: Option<&str>,
    default: Duration,
) -> Duration {
    match value {
        Some(text) => match humantime::parse_duration(text) {
            Ok(parsed) => parsed,
            Err(_) => {
                errors.push(format!("invalid duration for {field}: '{text}'"));
                default
            }
        },
        None => default,
    }
}

impl TargetFile {
    fn into_config(self) -> HarnessResult<TargetConfig> {
        let defaults = TargetConfig::default();
        let mut errors = Vec::new();

        let budgets = Budgets {
            command_timeout: file_duration(
                &mut errors,
                "command_timeout",
                self.command_timeout.as_deref(),
                defaults.budgets.command_timeout,
            ),
            poll_interval: file_duration(
                &mut errors,
                "poll_interval",
                self.poll_interval.as_deref(),
                defaults.budgets.poll_interval,
            ),
            poll_deadline: file_duration(
                &mut errors,
                "poll_deadline",
                self.poll_deadline.as_deref(),
                defaults.budgets.poll_deadline,
            ),
            endpoint_interval: file_duration(
                &mut errors,
                "endpoint_interval",
                self.endpoint_interval.as_deref(),
                defaults.budgets.endpoint_interval,
            ),
            endpoint_deadline: file_duration(
                &mut errors,
                "endpoint_deadline",
                self.endpoint_deadline.as_deref(),
                defaults.budgets.endpoint_deadline,
            ),
        };
        if !errors.is_empty() {
            return Err(HarnessError::SetupFailed(errors.join("; ")));
        }

        Ok(TargetConfig {
            snap: self.snap.unwrap_or(defaults.snap),
            process: self.process.unwrap_or(defaults.process),
            endpoint: self.endpoint.unwrap_or(defaults.endpoint),
            config_dir: self
                .config_dir
                .as_deref()
                .map(expand_home)
                .unwrap_or(defaults.config_dir),
            interface: self.interface.unwrap_or(defaults.interface),
            budgets,
        })
    }
}

impl TargetConfig {
    /// Full layered load: `SNAPCHECK_CONFIG` (or `./snapcheck.toml` when
    /// present) first, `SNAPCHECK_*` environment variables on top.
    pub fn load() -> HarnessResult<Self> {
        let base = match env::var(format!("{ENV_PREFIX}CONFIG")) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => {
                let default_file = Path::new(DEFAULT_CONFIG_FILE);
                if default_file.exists() {
                    Self::from_file(default_file)?
                } else {
                    Self::default()
                }
            }
        };
        base.overridden_by_env()
    }

    /// Builds the configuration from `SNAPCHECK_*` environment variables,
    /// falling back to the charmed-openstack-exporter defaults.
    pub fn from_env() -> HarnessResult<Self> {
        Self::default().overridden_by_env()
    }

    /// Reads a `snapcheck.toml`; missing fields keep their defaults.
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let file: TargetFile = toml::from_str(&raw).map_err(|err| {
            HarnessError::SetupFailed(format!(
                "invalid config file {}: {err}",
                path.display()
            ))
        })?;
        file.into_config()
    }

    fn overridden_by_env(self) -> HarnessResult<Self> {
        let mut parser = EnvParser::new();

        let config = Self {
            snap: parser.get_string("SNAP", &self.snap),
            process: parser.get_string("PROCESS", &self.process),
            endpoint: parser.get_string("ENDPOINT", &self.endpoint),
            config_dir: parser.get_path("CONFIG_DIR", &self.config_dir.to_string_lossy()),
            interface: parser.get_string("INTERFACE", &self.interface),
            budgets: Budgets {
                command_timeout: parser
                    .get_duration("COMMAND_TIMEOUT", self.budgets.command_timeout),
                poll_interval: parser.get_duration("POLL_INTERVAL", self.budgets.poll_interval),
                poll_deadline: parser.get_duration("POLL_DEADLINE", self.budgets.poll_deadline),
                endpoint_interval: parser
                    .get_duration("ENDPOINT_INTERVAL", self.budgets.endpoint_interval),
                endpoint_deadline: parser
                    .get_duration("ENDPOINT_DEADLINE", self.budgets.endpoint_deadline),
            },
        };

        parser.finish()?;
        Ok(config)
    }

    /// Service name used by `snap restart`.
    pub fn service(&self) -> String {
        format!("{}.service", self.snap)
    }

    /// The systemd unit backing the snap service.
    pub fn unit(&self) -> String {
        format!("snap.{}.service.service", self.snap)
    }

    /// The exposed binary alias, runnable directly from the shell.
    pub fn binary_alias(&self) -> String {
        format!("{}.{}", self.snap, self.process)
    }

    /// The clouds.yaml the session points `os-client-config` at.
    pub fn clouds_file(&self) -> PathBuf {
        self.config_dir.join("clouds.yaml")
    }

    /// Spare config file used by path-valued scenarios.
    pub fn aux_config_file(&self) -> PathBuf {
        self.config_dir.join("test.yaml")
    }
}

/// Serializes tests that mutate process environment variables.
pub fn env_test_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(Mutex::default)
        .lock()
        .unwrap_or_else(|p| p.into_inner())
}
