use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info};

use crate::config::model::{Frequency, RetentionPolicy};
use crate::error::{BestEffort, Result, VaultError};
use crate::pool::{SnapshotHandle, SnapshotIntent};
use crate::service::BackupService;
use crate::state::CycleGuard;

pub fn backup_description(pool: &str, at: DateTime<Utc>) -> String {
    format!(
        "Backup of {} pool at {}",
        pool,
        at.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

impl BackupService {
    /// Runs one backup cycle: snapshot, upload, retention, cleanup.
    pub fn perform_backup(&self) -> Result<()> {
        let now = self.deps.clock.now();
        let record = self.shared.read();
        let pool = self.settings.pool.as_str();

        if !record.config.enabled {
            self.shared.set_status("Backup skipped: service disabled");
            return Err(VaultError::BackupPreconditionFailed(
                "service disabled".to_string(),
            ));
        }
        if !record.state.repository_connected {
            self.shared.set_status("Backup skipped: repository not connected");
            return Err(VaultError::BackupPreconditionFailed(
                "repository not connected".to_string(),
            ));
        }
        let Some(window) = self.deps.windows.active_window(now) else {
            self.shared.set_status("Outside maintenance window");
            return Err(VaultError::BackupPreconditionFailed(
                "outside maintenance window".to_string(),
            ));
        };
        if !self.deps.pool.pool_exists(pool) {
            self.shared
                .set_status(format!("Failed to find pool: {} not found", pool));
            return Err(VaultError::BackupPreconditionFailed(format!(
                "pool {} not found",
                pool
            )));
        }
        let per_window = matches!(record.config.frequency(), Ok(Frequency::PerWindow));

        let cycle = self.shared.begin_cycle("Creating ZFS snapshot", || {
            VaultError::BackupPreconditionFailed(
                "a backup or restore is already in progress".to_string(),
            )
        })?;

        let snapshot = match self.snapshots.create_snapshot(pool, SnapshotIntent::Backup, now) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                cycle.fail(format!("Failed to create snapshot: {}", err));
                return Err(err);
            }
        };

        if let Err((status, err)) = self.upload(&cycle, &snapshot, now) {
            self.snapshots
                .destroy_snapshot(&snapshot)
                .best_effort("destroy backup snapshot");
            cycle.fail(status);
            if matches!(err, VaultError::BackupEngineFailed(_)) {
                // Next tick re-establishes the session before retrying.
                self.shared.update(|r| r.state.repository_connected = false);
            }
            return Err(err);
        }

        cycle.advance(75, "Applying retention policies");
        self.apply_retention(&record.config.retention)
            .best_effort("apply retention policy");

        cycle.advance(90, "Cleaning up ZFS snapshot");
        self.snapshots
            .destroy_snapshot(&snapshot)
            .best_effort("destroy backup snapshot");

        let finished = self.deps.clock.now();
        cycle.complete("Backup completed successfully", |r| {
            r.state.last_backup = Some(finished);
            if per_window {
                r.state.last_backup_window = Some(window.id.clone());
            }
        });
        info!(window = %window.id, "backup completed");
        Ok(())
    }

    fn upload(
        &self,
        cycle: &CycleGuard<'_>,
        snapshot: &SnapshotHandle,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), (String, VaultError)> {
        let path = self
            .snapshots
            .resolve_path(snapshot)
            .map_err(|e| (format!("Failed to get snapshot path: {}", e), e))?;

        cycle.advance(25, "Creating Kopia snapshot");
        let description = backup_description(&snapshot.pool, now);
        self.deps
            .engine
            .create_snapshot(&path, &description)
            .map_err(|e| (format!("Failed to create Kopia snapshot: {}", e), e))
    }

    /// Prunes repository snapshots; returns whether the engine was asked to.
    pub fn apply_retention(&self, policy: &RetentionPolicy) -> Result<bool> {
        if policy.is_empty() {
            debug!("no retention policy configured");
            return Ok(false);
        }
        self.deps.engine.expire_snapshots(policy)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{at, connected_config, Harness};
    use crate::window::MaintenanceWindow;

    #[test]
    fn description_names_pool_and_time() {
        assert_eq!(
            backup_description("local", at(2026, 3, 1, 2, 0)),
            "Backup of local pool at 2026-03-01T02:00:00Z"
        );
    }

    #[test]
    fn empty_retention_issues_no_prune() {
        let h = Harness::connected();
        assert!(!h
            .service
            .apply_retention(&RetentionPolicy::default())
            .expect("retention"));
        let zero = RetentionPolicy {
            keep_latest: Some(0),
            keep_monthly: Some(0),
            ..Default::default()
        };
        assert!(!h.service.apply_retention(&zero).expect("retention"));
        assert!(!h.engine_calls().iter().any(|c| c.starts_with("kopia expire")));
    }

    #[test]
    fn full_cycle_runs_in_order_and_cleans_up() {
        let h = Harness::connected();
        h.service.perform_backup().expect("backup");
        let calls = h.calls();
        let tail: Vec<&str> = calls
            .iter()
            .map(String::as_str)
            .skip_while(|c| !c.starts_with("zfs snapshot"))
            .collect();
        assert_eq!(
            tail,
            vec![
                "zfs snapshot local@kopia-20260301-020000",
                "kopia snapshot create",
                "kopia expire --keep-daily 7",
                "zfs destroy local@kopia-20260301-020000",
            ]
        );
        let state = h.service.get().state;
        assert!(!state.in_progress);
        assert_eq!(state.progress, 100);
        assert_eq!(state.last_status, "Backup completed successfully");
        assert_eq!(state.last_backup, Some(at(2026, 3, 1, 2, 0)));
        assert!(h.pool.snapshots().is_empty());
        assert_eq!(
            h.engine.snapshot_descriptions(),
            vec!["Backup of local pool at 2026-03-01T02:00:00Z".to_string()]
        );
    }

    #[test]
    fn engine_failure_destroys_transient_snapshot() {
        let h = Harness::connected();
        h.engine.fail("snapshot create");
        let err = h.service.perform_backup().unwrap_err();
        assert!(matches!(err, VaultError::BackupEngineFailed(_)));
        let state = h.service.get().state;
        assert!(!state.in_progress);
        assert_eq!(state.progress, 0);
        assert!(state.last_status.starts_with("Failed to create Kopia snapshot"));
        assert!(state.last_status.contains("injected snapshot create failure"));
        assert!(!h
            .pool
            .snapshots()
            .iter()
            .any(|s| s.starts_with("local@kopia-")));
        assert_eq!(state.last_backup, None);
        assert!(!state.repository_connected);
    }

    #[test]
    fn missing_snapshot_view_destroys_transient_snapshot() {
        let h = Harness::connected();
        h.pool.set_materialize(false);
        let err = h.service.perform_backup().unwrap_err();
        assert!(matches!(err, VaultError::SnapshotPathMissing(_)));
        assert!(h.pool.snapshots().is_empty());
        assert!(h
            .service
            .get()
            .state
            .last_status
            .starts_with("Failed to get snapshot path"));
    }

    #[test]
    fn snapshot_failure_aborts_before_upload() {
        let h = Harness::connected();
        h.pool.fail_snapshots_with_prefix("local@kopia-");
        let err = h.service.perform_backup().unwrap_err();
        assert!(matches!(err, VaultError::SnapshotOperationFailed(_)));
        assert!(!h.engine_calls().iter().any(|c| c == "kopia snapshot create"));
        assert!(!h.service.get().state.in_progress);
    }

    #[test]
    fn retention_and_cleanup_failures_do_not_fail_cycle() {
        let h = Harness::connected();
        h.engine.fail("expire");
        h.pool.fail("destroy");
        h.service.perform_backup().expect("backup");
        let state = h.service.get().state;
        assert_eq!(state.progress, 100);
        assert_eq!(state.last_status, "Backup completed successfully");
        assert_eq!(h.pool.snapshots(), vec!["local@kopia-20260301-020000".to_string()]);
    }

    #[test]
    fn disabled_service_never_uploads() {
        let h = Harness::connected();
        h.service
            .shared
            .update(|r| r.config.enabled = false);
        let err = h.service.perform_backup().unwrap_err();
        assert!(matches!(err, VaultError::BackupPreconditionFailed(_)));
        assert_eq!(
            h.service.get().state.last_status,
            "Backup skipped: service disabled"
        );
        assert!(h.pool.snapshots().is_empty());
        assert!(!h.engine_calls().iter().any(|c| c == "kopia snapshot create"));
    }

    #[test]
    fn requires_connected_repository() {
        let h = Harness::connected();
        h.service
            .shared
            .update(|r| r.state.repository_connected = false);
        let err = h.service.perform_backup().unwrap_err();
        assert!(matches!(err, VaultError::BackupPreconditionFailed(_)));
        let state = h.service.get().state;
        assert!(!state.in_progress);
        assert_eq!(state.last_status, "Backup skipped: repository not connected");
        assert!(h.pool.snapshots().is_empty());
    }

    #[test]
    fn window_is_rechecked_at_call_time() {
        // Harness clock sits at 02:00 UTC.
        let h = Harness::with_windows(vec![MaintenanceWindow {
            start_hour: 22,
            end_hour: 23,
            ..Default::default()
        }]);
        h.service.update(connected_config()).expect("update");
        let err = h.service.perform_backup().unwrap_err();
        assert!(matches!(err, VaultError::BackupPreconditionFailed(_)));
        assert_eq!(h.service.get().state.last_status, "Outside maintenance window");
        assert!(h.pool.snapshots().is_empty());
    }

    #[test]
    fn records_window_only_under_default_policy() {
        let h = Harness::connected();
        h.service.perform_backup().expect("backup");
        assert_eq!(
            h.service.get().state.last_backup_window.as_deref(),
            Some("always@2026-03-01")
        );

        let h = Harness::new();
        let mut cfg = connected_config();
        cfg.backup_frequency = "6h".to_string();
        h.service.update(cfg).expect("update");
        h.service.perform_backup().expect("backup");
        assert_eq!(h.service.get().state.last_backup_window, None);
    }
}
