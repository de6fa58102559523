use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tempfile::Builder;
use tracing::{info, warn};

use crate::config::model::ServiceConfig;
use crate::error::{Result, VaultError};
use crate::service::BackupService;

const REQUEST_POLL: Duration = Duration::from_secs(1);
const REQUEST_EXTENSION: &str = "yaml";

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Work handed from the command line to the daemon that owns the state file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Request {
    Update { config: ServiceConfig },
    Restore { snapshot_id: String },
    Backup,
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Update { .. } => "update",
            Request::Restore { .. } => "restore",
            Request::Backup => "backup",
        }
    }
}

/// A private directory of pending requests, applied in submission order.
/// Files are renamed into place complete, so a reader never sees a partial
/// request.
#[derive(Debug, Clone)]
pub struct RequestSpool {
    dir: PathBuf,
}

impl RequestSpool {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn submit(&self, request: &Request) -> Result<PathBuf> {
        let data = serde_yaml::to_string(request)
            .map_err(|e| VaultError::State(format!("encode {} request: {}", request.kind(), e)))?;
        self.ensure_dir()?;
        let mut file = Builder::new()
            .prefix(".incoming-")
            .tempfile_in(&self.dir)
            .map_err(|e| self.io_error("write", &self.dir, e))?;
        file.write_all(data.as_bytes())
            .and_then(|_| file.as_file().sync_all())
            .map_err(|e| self.io_error("write", file.path(), e))?;
        let path = self.dir.join(next_name());
        file.persist_noclobber(&path)
            .map_err(|e| self.io_error("rename", &path, e.error))?;
        Ok(path)
    }

    /// Removes and returns every complete request, oldest first. Unreadable
    /// entries are dropped with a warning.
    pub fn take_pending(&self) -> Result<Vec<Request>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(self.io_error("read", &self.dir, err)),
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_request_file(path))
            .collect();
        paths.sort();

        let mut requests = Vec::with_capacity(paths.len());
        for path in paths {
            let contents = match fs::read_to_string(&path) {
                Ok(contents) => contents,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "unreadable request");
                    continue;
                }
            };
            if let Err(err) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %err, "failed to remove request");
                continue;
            }
            match serde_yaml::from_str::<Request>(&contents) {
                Ok(request) => requests.push(request),
                Err(err) => warn!(path = %path.display(), error = %err, "discarding malformed request"),
            }
        }
        Ok(requests)
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| self.io_error("create", &self.dir, e))?;
        let mut perms = fs::metadata(&self.dir)
            .map_err(|e| self.io_error("stat", &self.dir, e))?
            .permissions();
        if perms.mode() & 0o777 != 0o700 {
            perms.set_mode(0o700);
            fs::set_permissions(&self.dir, perms)
                .map_err(|e| self.io_error("chmod", &self.dir, e))?;
        }
        Ok(())
    }

    fn io_error(&self, op: &str, path: &Path, err: io::Error) -> VaultError {
        VaultError::State(format!("{} {}: {}", op, path.display(), err))
    }
}

fn next_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let seq = SEQUENCE.fetch_add(1, Ordering::SeqCst);
    format!(
        "{:020}-{}-{:06}.{}",
        nanos,
        std::process::id(),
        seq,
        REQUEST_EXTENSION
    )
}

fn is_request_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|name| name.to_str())
        .map_or(true, |name| name.starts_with('.'));
    !hidden && path.extension().and_then(|ext| ext.to_str()) == Some(REQUEST_EXTENSION)
}

impl BackupService {
    /// Runs one request exactly as the matching command would locally.
    pub fn apply_request(&self, request: Request) -> Result<()> {
        match request {
            Request::Update { config } => self.update(config),
            Request::Restore { snapshot_id } => {
                let mut config = self.shared.read().config;
                config.restore_snapshot_id = snapshot_id;
                self.update(config)
            }
            Request::Backup => {
                self.start()?;
                self.perform_backup()
            }
        }
    }

    /// Drains `spool`, returning one outcome per request in order.
    pub fn apply_pending(&self, spool: &RequestSpool) -> Result<Vec<Result<()>>> {
        let requests = spool.take_pending()?;
        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            let kind = request.kind();
            let outcome = self.apply_request(request);
            match &outcome {
                Ok(()) => info!(kind, "request applied"),
                Err(err) => warn!(kind, error = %err, "request failed"),
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}

/// Applies spooled requests until `shutdown` is raised. Runs beside the
/// polling loop, so a request can arrive while a cycle is in flight.
pub fn run_request_loop(service: &BackupService, spool: &RequestSpool, shutdown: &AtomicBool) {
    info!(dir = %spool.dir().display(), "accepting requests");
    while !shutdown.load(Ordering::SeqCst) {
        if let Err(err) = service.apply_pending(spool) {
            warn!(error = %err, "failed to read request spool");
        }
        thread::sleep(REQUEST_POLL);
    }
    info!("request loop stopped");
}
