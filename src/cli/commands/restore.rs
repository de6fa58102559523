use anyhow::{Context, Result};

use crate::cli::commands::{queue_for_daemon, try_instance_lock};
use crate::config::host::HostSettings;
use crate::requests::Request;
use crate::service::BackupService;

/// Restores through the configuration trigger, exactly as a remote
/// configuration update carrying the snapshot id would. With the daemon
/// running the restore is queued for it.
pub fn run_restore(settings: HostSettings, snapshot_id: &str) -> Result<()> {
    let request = Request::Restore {
        snapshot_id: snapshot_id.to_string(),
    };
    let Some(_lock) = try_instance_lock(&settings)? else {
        return queue_for_daemon(&settings, &request);
    };
    let service = BackupService::open(settings)?;
    service
        .apply_request(request)
        .with_context(|| format!("restore of {} failed", snapshot_id))?;
    println!("{}", service.get().state.last_status);
    Ok(())
}
