//! In-memory collaborators for exercising the orchestrator without ZFS,
//! kopia, rsync or systemd. Every fake writes to one shared journal so tests
//! can assert on the interleaving of calls across tools.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use crate::clock::Clock;
use crate::config::host::HostSettings;
use crate::config::model::{
    Backend, BackendConfig, ObjectStoreConfig, RetentionPolicy, ServiceConfig,
};
use crate::engine::BackupEngine;
use crate::error::{Result, VaultError};
use crate::mirror::Mirror;
use crate::pool::PoolBackend;
use crate::service::{BackupService, Collaborators};
use crate::state::{ServiceRecord, SharedRecord, SnapshotInfo, StateFile};
use crate::units::{Unit, UnitRegistry};
use crate::window::{MaintenanceWindow, WindowSet};

#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0).unwrap()
}

pub fn connected_config() -> ServiceConfig {
    ServiceConfig {
        enabled: true,
        repository_password: "correct horse".to_string(),
        backend: BackendConfig {
            kind: "s3".to_string(),
            s3: Some(ObjectStoreConfig {
                endpoint: "s3.example.net".to_string(),
                bucket: "vault".to_string(),
                access_key: "AKIA".to_string(),
                secret_key: "shh".to_string(),
                region: None,
                disable_tls: false,
            }),
        },
        retention: RetentionPolicy {
            keep_daily: Some(7),
            ..Default::default()
        },
        backup_frequency: String::new(),
        restore_snapshot_id: String::new(),
    }
}

#[derive(Default)]
struct EngineFaults {
    failing: HashSet<String>,
    connect_failures: usize,
    listed: Vec<SnapshotInfo>,
    descriptions: Vec<String>,
}

pub struct FakeEngine {
    journal: Journal,
    faults: Mutex<EngineFaults>,
}

impl FakeEngine {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            faults: Mutex::new(EngineFaults::default()),
        }
    }

    pub fn fail(&self, op: &str) {
        self.faults.lock().unwrap().failing.insert(op.to_string());
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.faults.lock().unwrap().connect_failures = count;
    }

    pub fn add_listed(&self, id: &str) {
        self.faults.lock().unwrap().listed.push(SnapshotInfo {
            id: id.to_string(),
            time: at(2026, 2, 28, 2, 0),
            size: 4096,
            source: "/local/.zfs/snapshot/kopia-20260228-020000".to_string(),
            description: String::new(),
        });
    }

    pub fn snapshot_descriptions(&self) -> Vec<String> {
        self.faults.lock().unwrap().descriptions.clone()
    }

    fn call(&self, op: &str, entry: String) -> Result<()> {
        self.journal.record(entry);
        if self.faults.lock().unwrap().failing.contains(op) {
            return Err(VaultError::engine(format!("injected {} failure", op)));
        }
        Ok(())
    }
}

impl BackupEngine for FakeEngine {
    fn create_repository(&self, _backend: &Backend, _password: &str) -> Result<()> {
        self.call("create-repo", "kopia create-repo".to_string())
    }

    fn connect_repository(&self, _backend: &Backend, _password: &str) -> Result<()> {
        self.call("connect", "kopia connect".to_string())?;
        let mut faults = self.faults.lock().unwrap();
        if faults.connect_failures > 0 {
            faults.connect_failures -= 1;
            return Err(VaultError::engine("injected connect failure"));
        }
        Ok(())
    }

    fn create_snapshot(&self, _path: &Path, description: &str) -> Result<()> {
        self.call("snapshot create", "kopia snapshot create".to_string())?;
        self.faults
            .lock()
            .unwrap()
            .descriptions
            .push(description.to_string());
        Ok(())
    }

    fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>> {
        self.call("list", "kopia list".to_string())?;
        Ok(self.faults.lock().unwrap().listed.clone())
    }

    fn expire_snapshots(&self, retention: &RetentionPolicy) -> Result<()> {
        let flags: Vec<String> = retention
            .flags()
            .into_iter()
            .map(|(flag, count)| format!("{} {}", flag, count))
            .collect();
        self.call("expire", format!("kopia expire {}", flags.join(" ")))
    }

    fn restore_snapshot(&self, id: &str, target: &Path) -> Result<()> {
        self.call("restore", format!("kopia restore {}", id))?;
        fs::write(target.join("restored.txt"), id)?;
        Ok(())
    }
}

struct PoolState {
    exists: bool,
    materialize: bool,
    snapshots: Vec<String>,
    datasets: HashSet<String>,
    failing: HashSet<String>,
    failing_prefixes: Vec<String>,
}

pub struct FakePool {
    journal: Journal,
    mount: PathBuf,
    state: Mutex<PoolState>,
}

impl FakePool {
    pub fn new(mount: &Path) -> Self {
        Self::with_journal(mount, Journal::default())
    }

    pub fn with_journal(mount: &Path, journal: Journal) -> Self {
        Self {
            journal,
            mount: mount.to_path_buf(),
            state: Mutex::new(PoolState {
                exists: true,
                materialize: true,
                snapshots: Vec::new(),
                datasets: HashSet::new(),
                failing: HashSet::new(),
                failing_prefixes: Vec::new(),
            }),
        }
    }

    pub fn mount(&self) -> PathBuf {
        self.mount.clone()
    }

    pub fn snapshots(&self) -> Vec<String> {
        self.state.lock().unwrap().snapshots.clone()
    }

    pub fn set_materialize(&self, materialize: bool) {
        self.state.lock().unwrap().materialize = materialize;
    }

    pub fn set_pool_exists(&self, exists: bool) {
        self.state.lock().unwrap().exists = exists;
    }

    pub fn fail(&self, op: &str) {
        self.state.lock().unwrap().failing.insert(op.to_string());
    }

    pub fn fail_snapshots_with_prefix(&self, prefix: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_prefixes
            .push(prefix.to_string());
    }

    fn view_path(&self, full_name: &str) -> Option<PathBuf> {
        let (_, name) = full_name.split_once('@')?;
        Some(self.mount.join(".zfs").join("snapshot").join(name))
    }
}

impl PoolBackend for FakePool {
    fn pool_exists(&self, _pool: &str) -> bool {
        self.state.lock().unwrap().exists
    }

    fn dataset_exists(&self, name: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.datasets.contains(name) || state.snapshots.iter().any(|s| s == name)
    }

    fn create_dataset(&self, pool: &str, name: &str, _properties: &[(&str, &str)]) -> Result<()> {
        let full = format!("{}/{}", pool, name);
        self.journal.record(format!("zfs create {}", full));
        let mut state = self.state.lock().unwrap();
        if state.failing.contains("create") {
            return Err(VaultError::snapshot(format!("injected create failure for {}", full)));
        }
        state.datasets.insert(full);
        Ok(())
    }

    fn mountpoint(&self, _name: &str) -> Result<PathBuf> {
        Ok(self.mount.clone())
    }

    fn snapshot(&self, full_name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state
            .failing_prefixes
            .iter()
            .any(|prefix| full_name.starts_with(prefix.as_str()))
        {
            return Err(VaultError::snapshot(format!(
                "injected snapshot failure for {}",
                full_name
            )));
        }
        self.journal.record(format!("zfs snapshot {}", full_name));
        if state.materialize {
            if let Some(view) = self.view_path(full_name) {
                fs::create_dir_all(view)?;
            }
        }
        state.snapshots.push(full_name.to_string());
        Ok(())
    }

    fn destroy(&self, full_name: &str) -> Result<()> {
        self.journal.record(format!("zfs destroy {}", full_name));
        let mut state = self.state.lock().unwrap();
        if state.failing.contains("destroy") {
            return Err(VaultError::snapshot(format!(
                "injected destroy failure for {}",
                full_name
            )));
        }
        state.snapshots.retain(|s| s != full_name);
        if let Some(view) = self.view_path(full_name) {
            let _ = fs::remove_dir_all(view);
        }
        Ok(())
    }
}

pub struct FakeMirror {
    journal: Journal,
    failing: Mutex<bool>,
}

impl FakeMirror {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            failing: Mutex::new(false),
        }
    }

    pub fn fail(&self) {
        *self.failing.lock().unwrap() = true;
    }
}

impl Mirror for FakeMirror {
    fn mirror(&self, source: &Path, _dest: &Path, _excludes: &[&str]) -> Result<()> {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.journal.record(format!("mirror {}", name));
        if *self.failing.lock().unwrap() {
            return Err(VaultError::restore_step("injected mirror failure"));
        }
        Ok(())
    }
}

#[derive(Default)]
struct UnitsState {
    services: Vec<String>,
    applications: Vec<String>,
    disabled: HashSet<String>,
    failing: HashSet<String>,
}

pub struct FakeUnits {
    journal: Journal,
    state: Mutex<UnitsState>,
}

impl FakeUnits {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            state: Mutex::new(UnitsState::default()),
        }
    }

    pub fn add_service(&self, name: &str) {
        self.state.lock().unwrap().services.push(name.to_string());
    }

    pub fn add_application(&self, name: &str) {
        self.state.lock().unwrap().applications.push(name.to_string());
    }

    pub fn disable(&self, name: &str) {
        self.state.lock().unwrap().disabled.insert(name.to_string());
    }

    pub fn fail(&self, name: &str) {
        self.state.lock().unwrap().failing.insert(name.to_string());
    }

    fn act(&self, verb: &str, unit: &Unit) -> Result<()> {
        self.journal.record(format!("{} {}", verb, unit));
        if self.state.lock().unwrap().failing.contains(&unit.name) {
            return Err(VaultError::restore_step(format!("injected {} failure", verb)));
        }
        Ok(())
    }
}

impl UnitRegistry for FakeUnits {
    fn services(&self) -> Vec<Unit> {
        self.state
            .lock()
            .unwrap()
            .services
            .iter()
            .map(Unit::service)
            .collect()
    }

    fn applications(&self) -> Vec<Unit> {
        self.state
            .lock()
            .unwrap()
            .applications
            .iter()
            .map(Unit::application)
            .collect()
    }

    fn should_start(&self, unit: &Unit) -> bool {
        !self.state.lock().unwrap().disabled.contains(&unit.name)
    }

    fn start(&self, unit: &Unit) -> Result<()> {
        self.act("start", unit)
    }

    fn stop(&self, unit: &Unit) -> Result<()> {
        self.act("stop", unit)
    }
}

pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
}

impl FakeClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance_minutes(&self, minutes: i64) {
        *self.now.lock().unwrap() += Duration::minutes(minutes);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// A service wired to fakes, with state in a scratch directory.
pub struct Harness {
    pub dir: TempDir,
    pub journal: Journal,
    pub engine: Arc<FakeEngine>,
    pub pool: Arc<FakePool>,
    pub mirror: Arc<FakeMirror>,
    pub units: Arc<FakeUnits>,
    pub clock: Arc<FakeClock>,
    pub service: BackupService,
}

impl Harness {
    /// Disabled, unconnected service with no maintenance windows.
    pub fn new() -> Self {
        Self::with_windows(Vec::new())
    }

    /// Enabled service with an established repository session.
    pub fn connected() -> Self {
        let h = Self::new();
        h.service.update(connected_config()).expect("connect");
        h
    }

    pub fn with_windows(windows: Vec<MaintenanceWindow>) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let mount = dir.path().join("local");
        fs::create_dir_all(&mount).expect("mount dir");

        let journal = Journal::default();
        let engine = Arc::new(FakeEngine::new(journal.clone()));
        let pool = Arc::new(FakePool::with_journal(&mount, journal.clone()));
        let mirror = Arc::new(FakeMirror::new(journal.clone()));
        let units = Arc::new(FakeUnits::new(journal.clone()));
        let clock = Arc::new(FakeClock::new(at(2026, 3, 1, 2, 0)));

        let settings = HostSettings {
            state_path: dir.path().join("state.yaml"),
            cache_dir: dir.path().join("cache"),
            spool_dir: dir.path().join("requests"),
            maintenance_windows: windows.clone(),
            ..Default::default()
        };
        let deps = Collaborators {
            engine: engine.clone(),
            pool: pool.clone(),
            mirror: mirror.clone(),
            units: units.clone(),
            windows: Arc::new(WindowSet::new(windows)),
            clock: clock.clone(),
        };
        let shared =
            SharedRecord::open(StateFile::new(settings.state_path.clone())).expect("state");
        let service = BackupService::new(settings, shared, deps);

        Self {
            dir,
            journal,
            engine,
            pool,
            mirror,
            units,
            clock,
            service,
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.journal.entries()
    }

    pub fn engine_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with("kopia"))
            .collect()
    }

    /// The record as a fresh process would load it.
    pub fn reload(&self) -> ServiceRecord {
        StateFile::new(self.dir.path().join("state.yaml"))
            .load()
            .expect("reload")
    }

    /// A second service over the same state file and fakes, as after a
    /// daemon restart.
    pub fn reopen(&self) -> BackupService {
        let shared = SharedRecord::open(StateFile::new(self.service.settings.state_path.clone()))
            .expect("state");
        BackupService::new(
            self.service.settings.clone(),
            shared,
            self.service.deps.clone(),
        )
    }

    pub fn seed_restore_id(&self, id: &str) {
        self.service
            .shared
            .update(|r| r.config.restore_snapshot_id = id.to_string());
    }
}
