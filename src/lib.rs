pub mod backup;
pub mod cli;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod mirror;
pub mod pool;
pub mod repository;
pub mod requests;
pub mod restore;
pub mod scheduler;
pub mod service;
pub mod signal_handler;
pub mod state;
pub mod units;
pub mod util;
pub mod window;

#[cfg(test)]
mod testing;

pub use error::{Result, VaultError};
pub use service::BackupService;
