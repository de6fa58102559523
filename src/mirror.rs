use std::path::Path;
use std::process::Command;

use crate::error::{Result, VaultError};
use crate::util::command::run_capture;

/// Makes `dest` an exact copy of `source`, deleting anything not in `source`.
pub trait Mirror: Send + Sync {
    /// `excludes` are names relative to `dest` that are neither copied nor deleted.
    fn mirror(&self, source: &Path, dest: &Path, excludes: &[&str]) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct RsyncMirror;

pub fn rsync_args(source: &Path, dest: &Path, excludes: &[&str]) -> Vec<String> {
    let mut args = vec!["-a".to_string(), "--delete".to_string()];
    for exclude in excludes {
        args.push(format!("--exclude=/{}", exclude.trim_start_matches('/')));
    }
    // Trailing slashes: sync directory contents, not the directory itself.
    args.push(format!("{}/", source.display()));
    args.push(format!("{}/", dest.display()));
    args
}

impl Mirror for RsyncMirror {
    fn mirror(&self, source: &Path, dest: &Path, excludes: &[&str]) -> Result<()> {
        run_capture(Command::new("rsync").args(rsync_args(source, dest, excludes)))
            .map_err(|e| VaultError::restore_step(format!("failed to apply restored data: {}", e)))?;
        Ok(())
    }
}
