use std::path::Path;

use crate::config::model::{Backend, RetentionPolicy};
use crate::error::Result;
use crate::state::SnapshotInfo;

pub mod kopia;

/// The encrypting, deduplicating backup tool that owns the remote repository.
pub trait BackupEngine: Send + Sync {
    fn create_repository(&self, backend: &Backend, password: &str) -> Result<()>;
    fn connect_repository(&self, backend: &Backend, password: &str) -> Result<()>;
    fn create_snapshot(&self, path: &Path, description: &str) -> Result<()>;
    fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>>;
    /// Prunes repository snapshots. Only called with a non-empty policy.
    fn expire_snapshots(&self, retention: &RetentionPolicy) -> Result<()>;
    fn restore_snapshot(&self, id: &str, target: &Path) -> Result<()>;

    fn is_available(&self) -> bool {
        true
    }
}
