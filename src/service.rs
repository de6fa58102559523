use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::host::HostSettings;
use crate::config::model::ServiceConfig;
use crate::engine::kopia::KopiaEngine;
use crate::engine::BackupEngine;
use crate::error::Result;
use crate::mirror::{Mirror, RsyncMirror};
use crate::pool::zfs::ZfsPool;
use crate::pool::{PoolBackend, SnapshotManager};
use crate::state::{ServiceRecord, SharedRecord, StateFile};
use crate::units::{SystemdUnits, UnitRegistry};
use crate::window::{MaintenanceWindows, WindowSet};

/// External tools the orchestrator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub engine: Arc<dyn BackupEngine>,
    pub pool: Arc<dyn PoolBackend>,
    pub mirror: Arc<dyn Mirror>,
    pub units: Arc<dyn UnitRegistry>,
    pub windows: Arc<dyn MaintenanceWindows>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    pub fn for_host(settings: &HostSettings) -> Self {
        Self {
            engine: Arc::new(KopiaEngine::new(
                settings.engine_binary.clone(),
                settings.cache_dir.clone(),
            )),
            pool: Arc::new(ZfsPool),
            mirror: Arc::new(RsyncMirror),
            units: Arc::new(SystemdUnits::new(
                settings.services.clone(),
                settings.applications.clone(),
            )),
            windows: Arc::new(WindowSet::new(settings.maintenance_windows.clone())),
            clock: Arc::new(SystemClock),
        }
    }
}

/// A restore requested through a configuration update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreCommand {
    pub snapshot_id: String,
}

impl RestoreCommand {
    /// Consumes the trigger field from `requested`. Only a transition to a new,
    /// non-empty value relative to the persisted config is a command.
    pub fn take(previous: &ServiceConfig, requested: &mut ServiceConfig) -> Option<Self> {
        let id = requested.restore_snapshot_id.trim().to_string();
        if id.is_empty() || id == previous.restore_snapshot_id.trim() {
            return None;
        }
        requested.restore_snapshot_id.clear();
        Some(RestoreCommand { snapshot_id: id })
    }
}

pub struct BackupService {
    pub(crate) shared: SharedRecord,
    pub(crate) deps: Collaborators,
    pub(crate) snapshots: SnapshotManager,
    pub(crate) settings: HostSettings,
}

impl BackupService {
    pub fn new(settings: HostSettings, shared: SharedRecord, deps: Collaborators) -> Self {
        let snapshots = SnapshotManager::new(deps.pool.clone());
        Self {
            shared,
            deps,
            snapshots,
            settings,
        }
    }

    pub fn open(settings: HostSettings) -> Result<Self> {
        let shared = SharedRecord::open(StateFile::new(settings.state_path.clone()))?;
        let deps = Collaborators::for_host(&settings);
        Ok(Self::new(settings, shared, deps))
    }

    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    /// Current configuration and status. The snapshot list is refreshed on a
    /// best-effort basis; a refresh failure never fails the read.
    pub fn get(&self) -> ServiceRecord {
        let record = self.shared.read();
        if !(record.config.enabled && record.state.repository_connected) {
            return record;
        }
        match self.deps.engine.list_snapshots() {
            Ok(snapshots) => {
                self.shared
                    .update(|r| r.state.available_snapshots = snapshots);
                self.shared.read()
            }
            Err(err) => {
                warn!(error = %err, "failed to refresh snapshots");
                record
            }
        }
    }

    /// Applies a configuration update. A restore trigger runs before anything
    /// else changes and its field is always cleared afterwards.
    pub fn update(&self, mut requested: ServiceConfig) -> Result<()> {
        let previous = self.shared.read().config;

        if previous.enabled && !requested.enabled {
            self.stop()?;
        }

        if let Some(command) = RestoreCommand::take(&previous, &mut requested) {
            info!(snapshot = %command.snapshot_id, "restore requested");
            self.perform_restore(&command.snapshot_id)?;
        }

        let reconnect = requested.repository_changed(&previous);
        let enabled = requested.enabled;
        self.shared.update(|r| {
            r.config = requested;
            if reconnect {
                r.state.repository_connected = false;
            }
        });

        if enabled {
            self.ensure_connected()?;
        }
        Ok(())
    }

    pub fn start(&self) -> Result<()> {
        if !self.should_start() {
            return Ok(());
        }
        self.ensure_connected()
    }

    /// Drops the repository session and clears progress bookkeeping. A cycle
    /// that is already running is left to finish; cycles cannot be cancelled
    /// mid-step.
    pub fn stop(&self) -> Result<()> {
        self.shared.update(|r| {
            if !r.config.enabled {
                return;
            }
            r.state.repository_connected = false;
            if r.state.in_progress {
                info!(status = %r.state.last_status, "cycle in flight; letting it finish");
                return;
            }
            r.state.progress = 0;
        });
        debug!("service stopped");
        Ok(())
    }

    pub fn should_start(&self) -> bool {
        self.shared.read().config.enabled
    }

    pub fn supported(&self) -> bool {
        self.deps.engine.is_available()
    }
}
