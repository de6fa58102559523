use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use tracing::{info, warn};

use crate::cli::commands::hold_instance_lock;
use crate::config::host::HostSettings;
use crate::requests::{run_request_loop, RequestSpool};
use crate::scheduler::run_polling_loop;
use crate::service::BackupService;
use crate::signal_handler::signal_handler;

pub fn run_daemon(settings: HostSettings) -> Result<()> {
    let _lock = hold_instance_lock(&settings)?;
    let service = BackupService::open(settings)?;
    if !service.supported() {
        warn!(binary = %service.settings().engine_binary, "backup engine not available");
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_handler(shutdown.clone());

    if let Err(err) = service.start() {
        warn!(error = %err, "initial repository connection failed");
    }
    let spool = RequestSpool::new(service.settings().spool_dir.clone());
    thread::scope(|scope| {
        let requests = scope.spawn(|| run_request_loop(&service, &spool, &shutdown));
        run_polling_loop(&service, service.settings().poll_interval, &shutdown);
        if requests.join().is_err() {
            warn!("request loop panicked");
        }
    });
    service.stop()?;
    info!("daemon exiting");
    Ok(())
}
