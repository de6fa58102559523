use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::model::{Backend, ObjectStoreConfig, RetentionPolicy};
use crate::engine::BackupEngine;
use crate::error::{Result, VaultError};
use crate::state::SnapshotInfo;
use crate::util::command::{run_capture, run_quiet};

/// Drives the `kopia` command line.
pub struct KopiaEngine {
    binary: String,
    cache_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ListedSnapshot {
    id: String,
    source: ListedSource,
    #[serde(rename = "startTime")]
    start_time: DateTime<Utc>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    stats: ListedStats,
}

#[derive(Debug, Deserialize)]
struct ListedSource {
    #[serde(default)]
    path: String,
}

#[derive(Debug, Deserialize, Default)]
struct ListedStats {
    #[serde(rename = "totalSize", default)]
    total_size: i64,
}

pub fn parse_snapshot_list(json: &str) -> Result<Vec<SnapshotInfo>> {
    let listed: Vec<ListedSnapshot> = serde_json::from_str(json)
        .map_err(|e| VaultError::engine(format!("failed to parse snapshot list: {}", e)))?;
    Ok(listed
        .into_iter()
        .map(|snap| SnapshotInfo {
            id: snap.id,
            time: snap.start_time,
            size: snap.stats.total_size,
            source: snap.source.path,
            description: snap.description,
        })
        .collect())
}

fn s3_args(verb: &str, s3: &ObjectStoreConfig, password: &str) -> Vec<String> {
    let mut args = vec![
        "repository".to_string(),
        verb.to_string(),
        "s3".to_string(),
        "--bucket".to_string(),
        s3.bucket.clone(),
        "--endpoint".to_string(),
        s3.endpoint.clone(),
        "--access-key".to_string(),
        s3.access_key.clone(),
        "--secret-access-key".to_string(),
        s3.secret_key.clone(),
        "--password".to_string(),
        password.to_string(),
    ];
    if s3.disable_tls {
        args.push("--disable-tls".to_string());
    }
    if let Some(region) = s3.region.as_deref().filter(|r| !r.is_empty()) {
        args.push("--region".to_string());
        args.push(region.to_string());
    }
    args
}

pub fn expire_args(retention: &RetentionPolicy) -> Vec<String> {
    let mut args = vec!["snapshot".to_string(), "expire".to_string()];
    for (flag, count) in retention.flags() {
        args.push(flag.to_string());
        args.push(count.to_string());
    }
    args
}

impl KopiaEngine {
    pub fn new(binary: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            cache_dir: cache_dir.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.env("KOPIA_CACHE_DIRECTORY", &self.cache_dir);
        cmd
    }

    fn run(&self, args: &[String], what: &str) -> Result<String> {
        run_capture(self.command().args(args))
            .map_err(|e| VaultError::engine(format!("failed to {}: {}", what, e)))
    }

    fn repository(&self, verb: &str, backend: &Backend, password: &str) -> Result<()> {
        if password.is_empty() {
            return Err(VaultError::config(format!(
                "repository_password is required for repository {}",
                verb
            )));
        }
        let args = match backend {
            Backend::S3(s3) => s3_args(verb, s3, password),
        };
        self.run(&args, &format!("{} repository", verb))?;
        Ok(())
    }
}

impl BackupEngine for KopiaEngine {
    fn create_repository(&self, backend: &Backend, password: &str) -> Result<()> {
        self.repository("create", backend, password)
    }

    fn connect_repository(&self, backend: &Backend, password: &str) -> Result<()> {
        self.repository("connect", backend, password)
    }

    fn create_snapshot(&self, path: &Path, description: &str) -> Result<()> {
        let args = vec![
            "snapshot".to_string(),
            "create".to_string(),
            path.to_string_lossy().to_string(),
            "--description".to_string(),
            description.to_string(),
        ];
        self.run(&args, "create snapshot")?;
        Ok(())
    }

    fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>> {
        let args = ["snapshot", "list", "--json"].map(String::from);
        let output = self.run(&args, "list snapshots")?;
        parse_snapshot_list(&output)
    }

    fn expire_snapshots(&self, retention: &RetentionPolicy) -> Result<()> {
        self.run(&expire_args(retention), "apply retention policy")?;
        Ok(())
    }

    fn restore_snapshot(&self, id: &str, target: &Path) -> Result<()> {
        let args = vec![
            "snapshot".to_string(),
            "restore".to_string(),
            id.to_string(),
            target.to_string_lossy().to_string(),
        ];
        self.run(&args, "restore snapshot")?;
        Ok(())
    }

    fn is_available(&self) -> bool {
        run_quiet(Command::new(&self.binary).arg("--version"))
    }
}
