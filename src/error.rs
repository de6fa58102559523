use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("{0}")]
    ConfigInvalid(String),
    #[error("repository unavailable: {0}")]
    RepositoryUnavailable(String),
    #[error("snapshot {0}")]
    SnapshotOperationFailed(String),
    #[error("snapshot path does not exist: {}", .0.display())]
    SnapshotPathMissing(PathBuf),
    #[error("backup engine: {0}")]
    BackupEngineFailed(String),
    #[error("{0}")]
    BackupPreconditionFailed(String),
    #[error("{0}")]
    RestorePreconditionFailed(String),
    #[error("{0}")]
    RestoreStepFailed(String),
    #[error("state {0}")]
    State(String),
    #[error("{0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, VaultError>;

impl VaultError {
    pub fn config(msg: impl Into<String>) -> Self {
        VaultError::ConfigInvalid(msg.into())
    }

    pub fn snapshot(msg: impl Into<String>) -> Self {
        VaultError::SnapshotOperationFailed(msg.into())
    }

    pub fn engine(msg: impl Into<String>) -> Self {
        VaultError::BackupEngineFailed(msg.into())
    }

    pub fn restore_step(msg: impl Into<String>) -> Self {
        VaultError::RestoreStepFailed(msg.into())
    }
}

/// Consumes the result of a step whose failure degrades the outcome but must
/// not fail the surrounding cycle.
pub trait BestEffort {
    fn best_effort(self, what: &str);
}

impl<T> BestEffort for Result<T> {
    fn best_effort(self, what: &str) {
        if let Err(err) = self {
            warn!(error = %err, "{} failed; continuing", what);
        }
    }
}
