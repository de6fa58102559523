use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::model::ServiceConfig;
use crate::config::save::save_yaml;
use crate::error::{Result, VaultError};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub id: String,
    pub time: DateTime<Utc>,
    pub size: i64,
    pub source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct ServiceState {
    #[serde(default)]
    pub repository_connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_backup: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_backup_window: Option<String>,
    #[serde(default)]
    pub last_status: String,
    #[serde(default)]
    pub in_progress: bool,
    #[serde(default)]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_snapshots: Vec<SnapshotInfo>,
}

/// The persisted configuration and status of the service.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct ServiceRecord {
    #[serde(default)]
    pub config: ServiceConfig,
    #[serde(default)]
    pub state: ServiceState,
}

#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the record; a missing file is a fresh, disabled service. A cycle
    /// that was running when the previous process died is marked interrupted.
    pub fn load(&self) -> Result<ServiceRecord> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(ServiceRecord::default());
            }
            Err(err) => {
                return Err(VaultError::State(format!(
                    "read {}: {}",
                    self.path.display(),
                    err
                )))
            }
        };
        let mut record: ServiceRecord = serde_yaml::from_str(&contents)
            .map_err(|e| VaultError::State(format!("parse {}: {}", self.path.display(), e)))?;
        if record.state.in_progress {
            warn!(status = %record.state.last_status, "previous cycle was interrupted");
            record.state.last_status =
                format!("Interrupted: {}", record.state.last_status);
            record.state.in_progress = false;
            record.state.progress = 0;
        }
        Ok(record)
    }

    pub fn save(&self, record: &ServiceRecord) -> Result<()> {
        save_yaml(&self.path, record)
    }
}

/// The single owned service record. Every mutation is applied under the lock
/// and persisted before the lock is released.
pub struct SharedRecord {
    record: Mutex<ServiceRecord>,
    file: StateFile,
}

impl SharedRecord {
    pub fn new(record: ServiceRecord, file: StateFile) -> Self {
        Self {
            record: Mutex::new(record),
            file,
        }
    }

    /// Takes ownership of the persisted record. A repository session does not
    /// outlive the process that opened it, so the connection flag starts false
    /// and the owner has to reconnect.
    pub fn open(file: StateFile) -> Result<Self> {
        let mut record = file.load()?;
        record.state.repository_connected = false;
        Ok(Self::new(record, file))
    }

    fn lock(&self) -> MutexGuard<'_, ServiceRecord> {
        match self.record.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn read(&self) -> ServiceRecord {
        self.lock().clone()
    }

    pub fn update<R>(&self, apply: impl FnOnce(&mut ServiceRecord) -> R) -> R {
        let mut record = self.lock();
        let out = apply(&mut record);
        if let Err(err) = self.file.save(&record) {
            warn!(error = %err, path = %self.file.path().display(), "failed to persist service state");
        }
        out
    }

    pub fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        self.update(|r| r.state.last_status = status);
    }

    /// Atomically claims the single cycle slot. Fails with `busy` when another
    /// backup or restore is already running.
    pub fn begin_cycle(
        &self,
        status: &str,
        busy: impl FnOnce() -> VaultError,
    ) -> Result<CycleGuard<'_>> {
        let claimed = self.update(|r| {
            if r.state.in_progress {
                return false;
            }
            r.state.in_progress = true;
            r.state.progress = 0;
            r.state.last_status = status.to_string();
            true
        });
        if !claimed {
            return Err(busy());
        }
        info!(status, "cycle started");
        Ok(CycleGuard {
            shared: self,
            done: false,
        })
    }
}

/// Holds the cycle slot. Dropping it without `complete` releases the slot
/// with progress reset, leaving `last_status` as the failure reason.
pub struct CycleGuard<'a> {
    shared: &'a SharedRecord,
    done: bool,
}

impl CycleGuard<'_> {
    pub fn advance(&self, progress: u8, status: &str) {
        info!(progress, status, "cycle progress");
        self.shared.update(|r| {
            r.state.progress = r.state.progress.max(progress.min(100));
            r.state.last_status = status.to_string();
        });
    }

    /// Records a terminal failure and releases the slot.
    pub fn fail(mut self, status: String) {
        warn!(status = %status, "cycle failed");
        self.shared.update(|r| {
            r.state.in_progress = false;
            r.state.progress = 0;
            r.state.last_status = status;
        });
        self.done = true;
    }

    /// Marks the cycle finished and lets the caller record its results in the
    /// same persisted write.
    pub fn complete(mut self, status: &str, apply: impl FnOnce(&mut ServiceRecord)) {
        info!(status, "cycle completed");
        self.shared.update(|r| {
            r.state.in_progress = false;
            r.state.progress = 100;
            r.state.last_status = status.to_string();
            apply(r);
        });
        self.done = true;
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        self.shared.update(|r| {
            r.state.in_progress = false;
            r.state.progress = 0;
        });
    }
}
