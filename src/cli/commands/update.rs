use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::commands::{queue_for_daemon, try_instance_lock};
use crate::config::host::HostSettings;
use crate::config::load::load_service_config;
use crate::requests::Request;
use crate::service::BackupService;

pub fn run_update(settings: HostSettings, file: &Path) -> Result<()> {
    let requested = load_service_config(file)
        .with_context(|| format!("cannot use {}", file.display()))?;
    let Some(_lock) = try_instance_lock(&settings)? else {
        return queue_for_daemon(&settings, &Request::Update { config: requested });
    };
    let service = BackupService::open(settings)?;
    service.update(requested)?;
    println!("{}", service.get().state.last_status);
    Ok(())
}
