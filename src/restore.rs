use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{BestEffort, Result, VaultError};
use crate::pool::SnapshotIntent;
use crate::service::BackupService;
use crate::util::paths::create_private_dir;

/// Staging area under the pool mount; excluded when mirroring onto the mount.
pub const STAGING_DIR: &str = ".kopia-restore-temp";
const SNAPSHOT_DIR: &str = ".zfs";

/// Removes the staging directory when dropped, whatever the restore outcome.
pub struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    pub fn create(path: PathBuf) -> Result<Self> {
        match fs::remove_dir_all(&path) {
            Ok(()) => warn!(path = %path.display(), "removed leftover staging directory"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(VaultError::restore_step(format!(
                    "clear {}: {}",
                    path.display(),
                    err
                )))
            }
        }
        create_private_dir(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        fs::remove_dir_all(&self.path)
            .map_err(VaultError::from)
            .best_effort("remove staging directory");
    }
}

impl BackupService {
    /// Replaces the pool contents with a repository snapshot.
    ///
    /// Dependents are quiesced before anything is written and a safety
    /// snapshot of the pool is taken before the first destructive step, so a
    /// failure at any later point leaves an operator a rollback target.
    ///
    /// The one-shot `restore_snapshot_id` trigger is cleared in the persisted
    /// configuration whatever the outcome.
    pub fn perform_restore(&self, snapshot_id: &str) -> Result<()> {
        let outcome = self.restore_cycle(snapshot_id.trim());
        self.shared.update(|r| r.config.restore_snapshot_id.clear());
        outcome
    }

    fn restore_cycle(&self, snapshot_id: &str) -> Result<()> {
        let record = self.shared.read();
        let pool = self.settings.pool.as_str();

        if record.state.in_progress {
            return Err(VaultError::config(
                "cannot restore: a backup or restore cycle is already in progress",
            ));
        }
        if snapshot_id.is_empty() {
            return Err(VaultError::config("restore snapshot id is empty"));
        }
        if !record.state.repository_connected {
            self.shared.set_status("Restore failed: repository not connected");
            return Err(VaultError::RestorePreconditionFailed(
                "repository not connected".to_string(),
            ));
        }
        if !self.deps.pool.pool_exists(pool) {
            self.shared
                .set_status(format!("Restore failed: pool {} not found", pool));
            return Err(VaultError::RestorePreconditionFailed(format!(
                "pool {} not found",
                pool
            )));
        }

        let cycle = self.shared.begin_cycle("Stopping services", || {
            VaultError::config("cannot restore: a backup or restore cycle is already in progress")
        })?;
        info!(snapshot = snapshot_id, pool, "restore started");
        self.stop_dependents();

        cycle.advance(20, "Creating safety snapshot");
        let now = self.deps.clock.now();
        let safety = match self.snapshots.create_snapshot(pool, SnapshotIntent::Safety, now) {
            Ok(handle) => handle,
            Err(err) => {
                cycle.fail(format!("Failed to create safety snapshot: {}", err));
                return Err(VaultError::restore_step(format!(
                    "failed to create safety snapshot: {}",
                    err
                )));
            }
        };
        info!(snapshot = %safety, "safety snapshot created");

        cycle.advance(30, "Preparing restore location");
        let mountpoint = match self.deps.pool.mountpoint(pool) {
            Ok(path) => path,
            Err(err) => {
                cycle.fail(format!(
                    "Failed to get pool mountpoint: {} (safety snapshot {} kept)",
                    err, safety
                ));
                return Err(VaultError::restore_step(format!(
                    "failed to get pool mountpoint: {}",
                    err
                )));
            }
        };

        cycle.advance(40, "Creating staging directory");
        let staging = match StagingDir::create(mountpoint.join(STAGING_DIR)) {
            Ok(staging) => staging,
            Err(err) => {
                cycle.fail(format!(
                    "Failed to create temp restore path: {} (safety snapshot {} kept)",
                    err, safety
                ));
                return Err(err);
            }
        };

        cycle.advance(50, "Restoring snapshot");
        if let Err(err) = self.deps.engine.restore_snapshot(snapshot_id, staging.path()) {
            cycle.fail(format!(
                "Failed to restore snapshot: {} (safety snapshot {} kept)",
                err, safety
            ));
            return Err(VaultError::restore_step(format!(
                "failed to restore snapshot {}: {}",
                snapshot_id, err
            )));
        }

        cycle.advance(70, "Applying restored data");
        let applied =
            self.deps
                .mirror
                .mirror(staging.path(), &mountpoint, &[STAGING_DIR, SNAPSHOT_DIR]);
        drop(staging);
        if let Err(err) = applied {
            cycle.fail(format!(
                "Failed to apply restored data: {} (roll back with safety snapshot {})",
                err, safety
            ));
            return Err(err);
        }

        cycle.advance(80, "Starting services");
        self.start_dependents();

        cycle.complete("Restore completed successfully", |_| {});
        info!(snapshot = snapshot_id, safety = %safety, "restore completed");
        Ok(())
    }

    /// Applications first, then services, each in reverse startup order.
    fn stop_dependents(&self) {
        let units = self.deps.units.as_ref();
        for app in units.applications().iter().rev() {
            info!(unit = %app, "stopping");
            units.stop(app).best_effort(&format!("stop {}", app));
        }
        for service in units.services().iter().rev() {
            if service.name == self.settings.self_unit || !units.should_start(service) {
                continue;
            }
            info!(unit = %service, "stopping");
            units.stop(service).best_effort(&format!("stop {}", service));
        }
    }

    /// Services first, then applications, each in startup order.
    fn start_dependents(&self) {
        let units = self.deps.units.as_ref();
        for service in units.services() {
            if service.name == self.settings.self_unit || !units.should_start(&service) {
                continue;
            }
            info!(unit = %service, "starting");
            units.start(&service).best_effort(&format!("start {}", service));
        }
        for app in units.applications() {
            info!(unit = %app, "starting");
            units.start(&app).best_effort(&format!("start {}", app));
        }
    }
}
