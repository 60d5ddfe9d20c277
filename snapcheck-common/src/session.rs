//! Session lifecycle around a suite run.
//!
//! Provisioning installs the snap under test from a local file, prepares the
//! OpenStack client-config directory it expects, connects the confinement
//! interface, seeds a baseline configuration, and starts the service.
//! Teardown removes every trace again. Teardown keeps going past individual
//! failures so one stuck step cannot leave the rest of the machine dirty.

use std::path::Path;

use tracing::{info, warn};

use crate::errors::{HarnessError, HarnessResult};
use crate::harness::Harness;

/// Cloud name seeded into the baseline configuration.
pub const BASELINE_CLOUD: &str = "cloud";

/// Provisions and tears down the snap a harness points at.
pub struct SessionManager<'h> {
    harness: &'h Harness,
}

impl<'h> SessionManager<'h> {
    pub fn new(harness: &'h Harness) -> Self {
        Self { harness }
    }

    /// Installs the snap from `snap_file` and brings the service up.
    ///
    /// Stops at the first failing step; a half-provisioned machine is
    /// cleaned with [`SessionManager::teardown`].
    pub fn provision(&self, snap_file: &Path) -> HarnessResult<()> {
        let cfg = self.harness.config();
        let file = snap_file.to_string_lossy().into_owned();
        let config_dir = cfg.config_dir.to_string_lossy().into_owned();
        let clouds = cfg.clouds_file().to_string_lossy().into_owned();
        let aux = cfg.aux_config_file().to_string_lossy().into_owned();
        let plug = format!("{}:{}", cfg.snap, cfg.interface);
        let baseline_config = format!("os-client-config={clouds}");
        let baseline_cloud = format!("cloud={BASELINE_CLOUD}");

        info!(snap = %cfg.snap, file = %file, "provisioning session");
        self.must("snap", &["install", "--dangerous", &file])?;
        self.must("mkdir", &["-p", &config_dir])?;
        self.must("touch", &[&clouds])?;
        self.must("touch", &[&aux])?;
        self.must("snap", &["connect", &plug])?;
        // Both baseline keys land in a single transaction so the configure
        // hook sees a consistent pair.
        self.must("snap", &["set", &cfg.snap, &baseline_config, &baseline_cloud])?;
        self.must("snap", &["start", &cfg.snap])?;
        info!(snap = %cfg.snap, "session provisioned");
        Ok(())
    }

    /// Waits until the provisioned service is active and its endpoint
    /// answers 200.
    pub fn await_ready(&self) -> HarnessResult<()> {
        self.harness.service().await_active()?;
        self.harness.await_endpoint()
    }

    /// Removes the snap and the seeded files, attempting every step even
    /// when an earlier one fails.
    pub fn teardown(&self) -> HarnessResult<()> {
        let cfg = self.harness.config();
        let config_dir = cfg.config_dir.to_string_lossy().into_owned();
        let clouds = cfg.clouds_file().to_string_lossy().into_owned();
        let aux = cfg.aux_config_file().to_string_lossy().into_owned();

        info!(snap = %cfg.snap, "tearing session down");
        let mut failures: Vec<String> = Vec::new();
        self.attempt(&mut failures, "snap", &["remove", "--purge", &cfg.snap]);
        self.attempt(&mut failures, "rm", &[&clouds, &aux]);
        self.attempt(&mut failures, "rmdir", &[&config_dir]);

        if failures.is_empty() {
            info!(snap = %cfg.snap, "session removed");
            Ok(())
        } else {
            Err(HarnessError::CleanupFailed(failures.join("; ")))
        }
    }

    fn must(&self, program: &str, args: &[&str]) -> HarnessResult<()> {
        let out = self.harness.runner().run(program, args)?;
        if out.success() {
            Ok(())
        } else {
            Err(HarnessError::SetupFailed(format!(
                "{} {} exited {}: {}",
                program,
                args.join(" "),
                out.exit_code,
                out.stderr.trim()
            )))
        }
    }

    fn attempt(&self, failures: &mut Vec<String>, program: &str, args: &[&str]) {
        let rendered = format!("{} {}", program, args.join(" "));
        match self.harness.runner().run(program, args) {
            Ok(out) if out.success() => {}
            Ok(out) => {
                warn!(command = %rendered, exit_code = out.exit_code, "cleanup step failed");
                failures.push(format!(
                    "{rendered} exited {}: {}",
                    out.exit_code,
                    out.stderr.trim()
                ));
            }
            Err(err) => {
                warn!(command = %rendered, error = %err, "cleanup step failed");
                failures.push(format!("{rendered}: {err}"));
            }
        }
    }
}
