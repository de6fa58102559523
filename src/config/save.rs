use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{Result, VaultError};

/// Writes `value` as YAML next to `path` and renames it into place.
pub fn save_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_yaml::to_string(value)
        .map_err(|e| VaultError::State(format!("encode {}: {}", path.display(), e)))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)
        .map_err(|e| VaultError::State(format!("create {}: {}", dir.display(), e)))?;
    let mut file = NamedTempFile::new_in(dir)
        .map_err(|e| VaultError::State(format!("write {}: {}", path.display(), e)))?;
    file.write_all(data.as_bytes())
        .and_then(|_| file.as_file().sync_all())
        .map_err(|e| VaultError::State(format!("write {}: {}", path.display(), e)))?;
    file.persist(path)
        .map_err(|e| VaultError::State(format!("rename {}: {}", path.display(), e.error)))?;
    Ok(())
}
