use anyhow::Result;

use crate::cli::commands::try_instance_lock;
use crate::config::host::HostSettings;
use crate::service::BackupService;
use crate::state::{ServiceRecord, StateFile};

pub fn run_status(settings: HostSettings, refresh: bool) -> Result<()> {
    let lock = if refresh { try_instance_lock(&settings)? } else { None };
    let record = match lock {
        Some(_lock) => BackupService::open(settings)?.get(),
        // The daemon keeps the state file current while it runs.
        None => StateFile::new(settings.state_path.clone()).load()?,
    };
    print!("{}", render_status(&record));
    Ok(())
}

/// Human-readable status; secrets never appear in it.
pub fn render_status(record: &ServiceRecord) -> String {
    let (config, state) = (&record.config, &record.state);
    let mut out = String::new();
    out.push_str(&format!("enabled:     {}\n", config.enabled));
    out.push_str(&format!("backend:     {}\n", backend_summary(record)));
    out.push_str(&format!("connected:   {}\n", state.repository_connected));
    let frequency = if config.backup_frequency.is_empty() {
        "once per maintenance window"
    } else {
        config.backup_frequency.as_str()
    };
    out.push_str(&format!("frequency:   {}\n", frequency));
    if state.in_progress {
        out.push_str(&format!("running:     {}% {}\n", state.progress, state.last_status));
    } else {
        out.push_str(&format!("status:      {}\n", state.last_status));
    }
    match state.last_backup {
        Some(at) => out.push_str(&format!("last backup: {}\n", at.format("%Y-%m-%d %H:%M:%S UTC"))),
        None => out.push_str("last backup: never\n"),
    }
    out.push_str(&format!(
        "last window: {}\n",
        state.last_backup_window.as_deref().unwrap_or("none")
    ));
    out.push_str(&format!("snapshots:   {}\n", state.available_snapshots.len()));
    for snapshot in &state.available_snapshots {
        out.push_str(&format!(
            "  {}  {}  {:>12}  {}\n",
            snapshot.id,
            snapshot.time.format("%Y-%m-%d %H:%M:%S"),
            snapshot.size,
            snapshot.source
        ));
        if !snapshot.description.is_empty() {
            out.push_str(&format!("      {}\n", snapshot.description));
        }
    }
    out
}

fn backend_summary(record: &ServiceRecord) -> String {
    let backend = &record.config.backend;
    match &backend.s3 {
        Some(s3) => format!("{} {}/{}", backend.kind, s3.endpoint, s3.bucket),
        None if backend.kind.is_empty() => "none".to_string(),
        None => backend.kind.clone(),
    }
}
