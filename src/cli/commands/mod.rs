pub mod backup;
pub mod daemon;
pub mod restore;
pub mod status;
pub mod update;

use anyhow::Context;

use crate::config::host::HostSettings;
use crate::error::VaultError;
use crate::requests::{Request, RequestSpool};
use crate::util::paths::{acquire_instance_lock, instance_lock_path, InstanceLock};

pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_BUSY: i32 = 3;

pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<VaultError>() {
        Some(VaultError::ConfigInvalid(_)) => EXIT_CONFIG,
        _ => EXIT_FAILURE,
    }
}

pub fn exit_for_error(err: &anyhow::Error) -> ! {
    println!("{:#}", err);
    std::process::exit(exit_code(err));
}

/// Takes the pid lock guarding the state file; `None` while another
/// instance owns it.
pub fn try_instance_lock(settings: &HostSettings) -> anyhow::Result<Option<InstanceLock>> {
    let path = instance_lock_path(&settings.state_path);
    acquire_instance_lock(&path)
        .with_context(|| format!("failed to take instance lock {}", path.display()))
}

/// Like [`try_instance_lock`], but exits when another instance owns the lock.
pub fn hold_instance_lock(settings: &HostSettings) -> anyhow::Result<InstanceLock> {
    match try_instance_lock(settings)? {
        Some(lock) => Ok(lock),
        None => {
            println!(
                "another poolvault instance holds {}",
                instance_lock_path(&settings.state_path).display()
            );
            std::process::exit(EXIT_BUSY);
        }
    }
}

/// Hands `request` to the daemon that owns the state file.
pub fn queue_for_daemon(settings: &HostSettings, request: &Request) -> anyhow::Result<()> {
    let spool = RequestSpool::new(settings.spool_dir.clone());
    let path = spool
        .submit(request)
        .with_context(|| format!("failed to queue {} request", request.kind()))?;
    println!(
        "daemon is running; queued {} request {}",
        request.kind(),
        path.display()
    );
    println!("run `poolvault status` to follow it");
    Ok(())
}
