use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct ServiceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub repository_password: String,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub backup_frequency: String,
    /// One-shot restore command; cleared once the triggered restore returns.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub restore_snapshot_id: String,
}

/// Wire form of the backend: a kind tag plus the matching block.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct BackendConfig {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<ObjectStoreConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct ObjectStoreConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disable_tls: bool,
}

/// Validated backend, exactly one variant per supported kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    S3(ObjectStoreConfig),
}

impl BackendConfig {
    pub fn resolve(&self) -> Result<Backend> {
        match self.kind.trim() {
            "s3" => {
                let s3 = self
                    .s3
                    .as_ref()
                    .ok_or_else(|| VaultError::config("S3 backend configuration missing"))?;
                let missing: Vec<&str> = [
                    ("endpoint", &s3.endpoint),
                    ("bucket", &s3.bucket),
                    ("access_key", &s3.access_key),
                    ("secret_key", &s3.secret_key),
                ]
                .into_iter()
                .filter(|(_, value)| value.trim().is_empty())
                .map(|(name, _)| name)
                .collect();
                if !missing.is_empty() {
                    return Err(VaultError::config(format!(
                        "S3 configuration incomplete: missing {}",
                        missing.join(", ")
                    )));
                }
                Ok(Backend::S3(s3.clone()))
            }
            "" => Err(VaultError::config("backend type is required")),
            other => Err(VaultError::config(format!("unsupported backend type: {}", other))),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_latest: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_hourly: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_daily: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_weekly: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_monthly: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_annual: Option<u32>,
}

impl RetentionPolicy {
    /// Engine flags for every rule that constrains anything. Zero counts as unset.
    pub fn flags(&self) -> Vec<(&'static str, u32)> {
        [
            ("--keep-latest", self.keep_latest),
            ("--keep-hourly", self.keep_hourly),
            ("--keep-daily", self.keep_daily),
            ("--keep-weekly", self.keep_weekly),
            ("--keep-monthly", self.keep_monthly),
            ("--keep-annual", self.keep_annual),
        ]
        .into_iter()
        .filter_map(|(flag, count)| count.filter(|n| *n > 0).map(|n| (flag, n)))
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.flags().is_empty()
    }
}

/// How often the scheduler is allowed to start a backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    /// At most once per maintenance window.
    PerWindow,
    Every(Duration),
}

impl ServiceConfig {
    pub fn frequency(&self) -> Result<Frequency> {
        let value = self.backup_frequency.trim();
        if value.is_empty() {
            return Ok(Frequency::PerWindow);
        }
        let interval = humantime::parse_duration(value).map_err(|e| {
            VaultError::config(format!("backup_frequency {:?} is invalid: {}", value, e))
        })?;
        if interval.is_zero() {
            return Err(VaultError::config(format!(
                "backup_frequency {:?} must be positive",
                value
            )));
        }
        Ok(Frequency::Every(interval))
    }

    pub fn validate(&self) -> Result<Backend> {
        let backend = self.backend.resolve()?;
        if self.enabled && self.repository_password.is_empty() {
            return Err(VaultError::config("repository_password is required"));
        }
        Ok(backend)
    }

    /// Whether a change from `previous` invalidates the current repository session.
    pub fn repository_changed(&self, previous: &ServiceConfig) -> bool {
        self.backend != previous.backend || self.repository_password != previous.repository_password
    }
}
