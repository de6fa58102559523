use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::window::MaintenanceWindow;

pub const DEFAULT_STATE_PATH: &str = "/var/lib/poolvault/state.yaml";
pub const DEFAULT_POOL: &str = "local";
pub const DEFAULT_CACHE_DATASET: &str = "kopia-cache";
pub const DEFAULT_CACHE_DIR: &str = "/var/lib/poolvault/kopia";
pub const DEFAULT_SPOOL_DIR: &str = "/var/lib/poolvault/requests";
pub const DEFAULT_POLL_INTERVAL: &str = "1m";
pub const DEFAULT_ENGINE_BINARY: &str = "kopia";
pub const DEFAULT_SELF_UNIT: &str = "poolvault";

/// On-disk host configuration, as written by the operator.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct HostConfig {
    #[serde(default, rename = "statePath", skip_serializing_if = "Option::is_none")]
    pub state_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
    #[serde(default, rename = "cacheDataset", skip_serializing_if = "Option::is_none")]
    pub cache_dataset: Option<String>,
    #[serde(default, rename = "cacheDir", skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    #[serde(default, rename = "spoolDir", skip_serializing_if = "Option::is_none")]
    pub spool_dir: Option<PathBuf>,
    #[serde(default, rename = "pollInterval", skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<String>,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default, rename = "maintenanceWindows")]
    pub maintenance_windows: Vec<MaintenanceWindow>,
    #[serde(default)]
    pub units: UnitsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct EngineConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct UnitsConfig {
    #[serde(default, rename = "self", skip_serializing_if = "Option::is_none")]
    pub self_name: Option<String>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub applications: Vec<String>,
}

/// Host configuration with defaults applied and values validated.
#[derive(Debug, Clone)]
pub struct HostSettings {
    pub state_path: PathBuf,
    pub pool: String,
    pub cache_dataset: String,
    pub cache_dir: PathBuf,
    /// Where command-line requests wait for the running daemon.
    pub spool_dir: PathBuf,
    pub poll_interval: Duration,
    pub engine_binary: String,
    pub maintenance_windows: Vec<MaintenanceWindow>,
    pub self_unit: String,
    pub services: Vec<String>,
    pub applications: Vec<String>,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
            pool: DEFAULT_POOL.to_string(),
            cache_dataset: DEFAULT_CACHE_DATASET.to_string(),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            spool_dir: PathBuf::from(DEFAULT_SPOOL_DIR),
            poll_interval: Duration::from_secs(60),
            engine_binary: DEFAULT_ENGINE_BINARY.to_string(),
            maintenance_windows: Vec::new(),
            self_unit: DEFAULT_SELF_UNIT.to_string(),
            services: Vec::new(),
            applications: Vec::new(),
        }
    }
}
