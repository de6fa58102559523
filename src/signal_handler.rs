use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use tracing::{error, info};

/// Raises `shutdown` on SIGINT or SIGTERM. A cycle already running is
/// allowed to reach its next step boundary; the polling loop exits after it.
pub fn signal_handler(shutdown: Arc<AtomicBool>) {
    thread::spawn(move || {
        let mut signals = match Signals::new([SIGINT, SIGTERM]) {
            Ok(signals) => signals,
            Err(err) => {
                error!(error = %err, "signal handler setup failed");
                return;
            }
        };
        if let Some(signal) = signals.forever().next() {
            info!(signal, "shutdown requested");
            shutdown.store(true, Ordering::SeqCst);
        }
    });
}
