use anyhow::{Context, Result};

use crate::cli::commands::{queue_for_daemon, try_instance_lock};
use crate::config::host::HostSettings;
use crate::requests::Request;
use crate::service::BackupService;

pub fn run_backup(settings: HostSettings) -> Result<()> {
    let Some(_lock) = try_instance_lock(&settings)? else {
        return queue_for_daemon(&settings, &Request::Backup);
    };
    let service = BackupService::open(settings)?;
    service.start().context("repository connection failed")?;
    service.perform_backup().context("backup failed")?;
    println!("{}", service.get().state.last_status);
    Ok(())
}
