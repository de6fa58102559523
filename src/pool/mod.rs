//! Copy-on-write snapshots of the storage pool.
//!
//! Snapshot names carry their intent so that a restore's safety snapshot can
//! never be confused with (or cleaned up as) a transient backup snapshot.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{Result, VaultError};

pub mod zfs;

/// Snapshots taken within the same second get `-1`, `-2`, ... appended.
const MAX_NAME_SUFFIX: u32 = 99;

/// Filesystem primitives the orchestrator needs from the pool.
pub trait PoolBackend: Send + Sync {
    fn pool_exists(&self, pool: &str) -> bool;
    /// Also true for an existing `pool@snapshot` name.
    fn dataset_exists(&self, name: &str) -> bool;
    fn create_dataset(&self, pool: &str, name: &str, properties: &[(&str, &str)]) -> Result<()>;
    /// Where the dataset's live contents are mounted.
    fn mountpoint(&self, name: &str) -> Result<PathBuf>;
    fn snapshot(&self, full_name: &str) -> Result<()>;
    fn destroy(&self, full_name: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotIntent {
    /// Consistent source for one backup upload; destroyed afterwards.
    Backup,
    /// Rollback point taken before a restore; never removed automatically.
    Safety,
}

impl SnapshotIntent {
    pub fn prefix(&self) -> &'static str {
        match self {
            SnapshotIntent::Backup => "kopia-",
            SnapshotIntent::Safety => "before-restore-",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHandle {
    pub pool: String,
    pub name: String,
    pub intent: SnapshotIntent,
}

impl SnapshotHandle {
    pub fn full_name(&self) -> String {
        format!("{}@{}", self.pool, self.name)
    }
}

impl fmt::Display for SnapshotHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

#[derive(Clone)]
pub struct SnapshotManager {
    backend: Arc<dyn PoolBackend>,
}

impl SnapshotManager {
    pub fn new(backend: Arc<dyn PoolBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &dyn PoolBackend {
        self.backend.as_ref()
    }

    pub fn create_snapshot(
        &self,
        pool: &str,
        intent: SnapshotIntent,
        now: DateTime<Utc>,
    ) -> Result<SnapshotHandle> {
        let base = format!("{}{}", intent.prefix(), now.format("%Y%m%d-%H%M%S"));
        let mut handle = SnapshotHandle {
            pool: pool.to_string(),
            name: base.clone(),
            intent,
        };
        let mut suffix = 0;
        while self.backend.dataset_exists(&handle.full_name()) {
            suffix += 1;
            if suffix > MAX_NAME_SUFFIX {
                return Err(VaultError::snapshot(format!(
                    "no free snapshot name for {}@{}",
                    pool, base
                )));
            }
            handle.name = format!("{}-{}", base, suffix);
        }
        self.backend.snapshot(&handle.full_name())?;
        Ok(handle)
    }

    /// Path of the snapshot's read-only view under the pool mount.
    pub fn resolve_path(&self, handle: &SnapshotHandle) -> Result<PathBuf> {
        let mountpoint = self.backend.mountpoint(&handle.pool)?;
        let path = mountpoint.join(".zfs").join("snapshot").join(&handle.name);
        if !path.exists() {
            return Err(VaultError::SnapshotPathMissing(path));
        }
        Ok(path)
    }

    pub fn destroy_snapshot(&self, handle: &SnapshotHandle) -> Result<()> {
        self.backend.destroy(&handle.full_name())
    }
}
