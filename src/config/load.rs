use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::config::host::{
    HostConfig, HostSettings, DEFAULT_CACHE_DATASET, DEFAULT_CACHE_DIR, DEFAULT_ENGINE_BINARY,
    DEFAULT_POLL_INTERVAL, DEFAULT_POOL, DEFAULT_SELF_UNIT, DEFAULT_SPOOL_DIR, DEFAULT_STATE_PATH,
};
use crate::config::model::ServiceConfig;
use crate::error::{Result, VaultError};
use crate::util::paths::is_safe_name;

const MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);

fn read_file(path: &Path) -> Result<String> {
    let mut contents = String::new();
    File::open(path)
        .and_then(|mut f| f.read_to_string(&mut contents))
        .map_err(|e| VaultError::config(format!("read {}: {}", path.display(), e)))?;
    Ok(contents)
}

/// Loads the host configuration. A missing file yields the built-in defaults.
pub fn load_host_config(path: &Path) -> Result<HostSettings> {
    let cfg: HostConfig = match std::fs::metadata(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "host config missing; using defaults");
            HostConfig::default()
        }
        _ => serde_yaml::from_str(&read_file(path)?)
            .map_err(|e| VaultError::config(format!("parse config {}: {}", path.display(), e)))?,
    };
    parse_settings(cfg)
}

/// Loads a service configuration update request.
pub fn load_service_config(path: &Path) -> Result<ServiceConfig> {
    serde_yaml::from_str(&read_file(path)?)
        .map_err(|e| VaultError::config(format!("parse {}: {}", path.display(), e)))
}

pub fn parse_settings(cfg: HostConfig) -> Result<HostSettings> {
    let pool = cfg.pool.unwrap_or_else(|| DEFAULT_POOL.to_string());
    if !is_safe_name(&pool) {
        return Err(VaultError::config(format!(
            "pool {} must use only letters, digits, '.', '-', '_'",
            pool
        )));
    }
    let cache_dataset = cfg
        .cache_dataset
        .unwrap_or_else(|| DEFAULT_CACHE_DATASET.to_string());
    if !is_safe_name(&cache_dataset) {
        return Err(VaultError::config(format!(
            "cacheDataset {} must use only letters, digits, '.', '-', '_'",
            cache_dataset
        )));
    }
    let cache_dir = cfg.cache_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));
    if !cache_dir.is_absolute() {
        return Err(VaultError::config("cacheDir must be absolute"));
    }
    let spool_dir = cfg.spool_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_SPOOL_DIR));
    if !spool_dir.is_absolute() {
        return Err(VaultError::config("spoolDir must be absolute"));
    }

    let raw_interval = cfg
        .poll_interval
        .unwrap_or_else(|| DEFAULT_POLL_INTERVAL.to_string());
    let poll_interval = humantime::parse_duration(raw_interval.trim())
        .map_err(|e| VaultError::config(format!("pollInterval {:?}: {}", raw_interval, e)))?;
    if poll_interval.is_zero() || poll_interval > MAX_POLL_INTERVAL {
        return Err(VaultError::config(format!(
            "pollInterval {:?} must be positive and at most 1m",
            raw_interval
        )));
    }

    for (idx, window) in cfg.maintenance_windows.iter().enumerate() {
        window
            .validate()
            .map_err(|e| VaultError::config(format!("maintenanceWindows[{}]: {}", idx, e)))?;
    }

    let self_unit = cfg
        .units
        .self_name
        .unwrap_or_else(|| DEFAULT_SELF_UNIT.to_string());

    Ok(HostSettings {
        state_path: cfg
            .state_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_PATH)),
        pool,
        cache_dataset,
        cache_dir,
        spool_dir,
        poll_interval,
        engine_binary: cfg
            .engine
            .binary
            .unwrap_or_else(|| DEFAULT_ENGINE_BINARY.to_string()),
        maintenance_windows: cfg.maintenance_windows,
        self_unit,
        services: cfg.units.services,
        applications: cfg.units.applications,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn load_host_config_with_windows_and_units() {
        let mut file = NamedTempFile::new().expect("tempfile");
        let yaml = r#"
statePath: "/tmp/poolvault/state.yaml"
pool: "tank"
pollInterval: "30s"
engine:
  binary: "/usr/local/bin/kopia"
maintenanceWindows:
  - name: "nightly"
    startHour: 1
    startMinute: 0
    endHour: 5
    endMinute: 30
units:
  self: "poolvault"
  services: ["incus", "ovn"]
  applications: ["web"]
"#;
        file.write_all(yaml.as_bytes()).expect("write");
        let cfg = load_host_config(file.path()).expect("load");
        assert_eq!(cfg.pool, "tank");
        assert_eq!(cfg.poll_interval, Duration::from_secs(30));
        assert_eq!(cfg.engine_binary, "/usr/local/bin/kopia");
        assert_eq!(cfg.maintenance_windows.len(), 1);
        assert_eq!(cfg.services, vec!["incus".to_string(), "ovn".to_string()]);
        assert_eq!(cfg.cache_dataset, DEFAULT_CACHE_DATASET);
        assert_eq!(cfg.spool_dir, PathBuf::from(DEFAULT_SPOOL_DIR));
    }

    #[test]
    fn missing_host_config_uses_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let cfg = load_host_config(&dir.path().join("absent.yaml")).expect("load");
        assert_eq!(cfg.pool, DEFAULT_POOL);
        assert_eq!(cfg.poll_interval, Duration::from_secs(60));
        assert!(cfg.maintenance_windows.is_empty());
    }

    #[test]
    fn poll_interval_coarser_than_a_minute_is_rejected() {
        let cfg = HostConfig {
            poll_interval: Some("5m".to_string()),
            ..Default::default()
        };
        assert!(matches!(parse_settings(cfg), Err(VaultError::ConfigInvalid(_))));
    }

    #[test]
    fn relative_spool_dir_is_rejected() {
        let cfg = HostConfig {
            spool_dir: Some(PathBuf::from("requests")),
            ..Default::default()
        };
        assert!(matches!(parse_settings(cfg), Err(VaultError::ConfigInvalid(_))));
    }

    #[test]
    fn unsafe_pool_name_is_rejected() {
        let cfg = HostConfig {
            pool: Some("tank/../x".to_string()),
            ..Default::default()
        };
        assert!(parse_settings(cfg).is_err());
    }
}
