use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::model::Frequency;
use crate::error::{Result, VaultError};
use crate::service::BackupService;
use crate::state::ServiceRecord;
use crate::window::{ActiveWindow, MaintenanceWindows};

const SLEEP_SLICE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    CycleRunning,
    NotConnected,
    OutsideWindow,
    AlreadyRanInWindow,
    TooSoon,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Run(ActiveWindow),
    Skip(SkipReason),
}

/// Whether a backup cycle should start at `now`. An unusable
/// `backup_frequency` is a configuration error, never a run.
pub fn decide(
    record: &ServiceRecord,
    windows: &dyn MaintenanceWindows,
    now: DateTime<Utc>,
) -> Result<Decision> {
    let (config, state) = (&record.config, &record.state);
    if !config.enabled {
        return Ok(Decision::Skip(SkipReason::Disabled));
    }
    if state.in_progress {
        return Ok(Decision::Skip(SkipReason::CycleRunning));
    }
    if !state.repository_connected {
        return Ok(Decision::Skip(SkipReason::NotConnected));
    }
    let frequency = config.frequency()?;
    let Some(window) = windows.active_window(now) else {
        return Ok(Decision::Skip(SkipReason::OutsideWindow));
    };
    match frequency {
        Frequency::PerWindow => {
            if state.last_backup_window.as_deref() == Some(window.id.as_str()) {
                return Ok(Decision::Skip(SkipReason::AlreadyRanInWindow));
            }
        }
        Frequency::Every(interval) => {
            let interval = chrono::Duration::from_std(interval)
                .map_err(|e| VaultError::config(format!("backup_frequency: {}", e)))?;
            if let Some(last) = state.last_backup {
                if now - last < interval {
                    return Ok(Decision::Skip(SkipReason::TooSoon));
                }
            }
        }
    }
    Ok(Decision::Run(window))
}

impl BackupService {
    /// One scheduler evaluation; runs a backup cycle when due.
    pub fn tick(&self) -> Result<Decision> {
        let now = self.deps.clock.now();
        let mut record = self.shared.read();
        if record.config.enabled && !record.state.repository_connected && !record.state.in_progress
        {
            if let Err(err) = self.ensure_connected() {
                debug!(error = %err, "repository still unavailable");
            }
            record = self.shared.read();
        }
        let decision = match decide(&record, self.deps.windows.as_ref(), now) {
            Ok(decision) => decision,
            Err(err) => {
                let status = format!("Scheduling disabled: {}", err);
                if record.state.last_status != status {
                    self.shared.set_status(status);
                }
                return Err(err);
            }
        };
        match &decision {
            Decision::Run(window) => {
                info!(window = %window.id, "backup due");
                self.perform_backup()?;
            }
            Decision::Skip(reason) => debug!(?reason, "no backup due"),
        }
        Ok(decision)
    }
}

/// Ticks `service` every `interval` until `shutdown` is raised. Tick failures
/// are logged and never end the loop.
pub fn run_polling_loop(service: &BackupService, interval: Duration, shutdown: &AtomicBool) {
    info!(interval = %humantime::format_duration(interval), "scheduler started");
    while !shutdown.load(Ordering::SeqCst) {
        let started = Instant::now();
        if let Err(err) = service.tick() {
            warn!(error = %err, "scheduler tick failed");
        }
        while started.elapsed() < interval && !shutdown.load(Ordering::SeqCst) {
            thread::sleep(SLEEP_SLICE.min(interval));
        }
    }
    info!("scheduler stopped");
}
