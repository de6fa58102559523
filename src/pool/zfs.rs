use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Result, VaultError};
use crate::pool::PoolBackend;
use crate::util::command::{run_capture, run_quiet};

/// `zfs`/`zpool` command line adapter.
#[derive(Debug, Default)]
pub struct ZfsPool;

/// Pools without a usable mountpoint property are mounted at `/<pool>`.
pub fn effective_mountpoint(name: &str, property: &str) -> PathBuf {
    match property.trim() {
        "none" | "legacy" | "-" | "" => Path::new("/").join(name),
        value => PathBuf::from(value),
    }
}

impl PoolBackend for ZfsPool {
    fn pool_exists(&self, pool: &str) -> bool {
        run_quiet(Command::new("zpool").args(["list", "-H", "-o", "name", pool]))
    }

    fn dataset_exists(&self, name: &str) -> bool {
        run_quiet(Command::new("zfs").args(["list", "-H", "-t", "all", "-o", "name", name]))
    }

    fn create_dataset(&self, pool: &str, name: &str, properties: &[(&str, &str)]) -> Result<()> {
        let dataset = format!("{}/{}", pool, name);
        let mut cmd = Command::new("zfs");
        cmd.arg("create");
        for (key, value) in properties {
            cmd.arg("-o").arg(format!("{}={}", key, value));
        }
        cmd.arg(&dataset);
        run_capture(&mut cmd)
            .map_err(|e| VaultError::snapshot(format!("create dataset {}: {}", dataset, e)))?;
        Ok(())
    }

    fn mountpoint(&self, name: &str) -> Result<PathBuf> {
        let output = run_capture(Command::new("zfs").args([
            "get", "-H", "-o", "value", "mountpoint", name,
        ]))
        .map_err(|e| VaultError::snapshot(format!("get mountpoint of {}: {}", name, e)))?;
        Ok(effective_mountpoint(name, &output))
    }

    fn snapshot(&self, full_name: &str) -> Result<()> {
        run_capture(Command::new("zfs").args(["snapshot", full_name]))
            .map_err(|e| VaultError::snapshot(format!("create {}: {}", full_name, e)))?;
        Ok(())
    }

    fn destroy(&self, full_name: &str) -> Result<()> {
        if !full_name.contains('@') {
            return Err(VaultError::snapshot(format!(
                "refusing to destroy {}: not a snapshot",
                full_name
            )));
        }
        run_capture(Command::new("zfs").args(["destroy", full_name]))
            .map_err(|e| VaultError::snapshot(format!("destroy {}: {}", full_name, e)))?;
        Ok(())
    }
}
