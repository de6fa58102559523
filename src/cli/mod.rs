use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::args::{Cli, Command};
use crate::cli::commands::{backup, daemon, exit_for_error, restore, status, update};
use crate::config::load::load_host_config;

const CONFIG_FILE: &str = "/etc/poolvault.yaml";

pub mod args;
pub mod commands;

pub fn run() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let settings = match load_host_config(&config_path) {
        Ok(settings) => settings,
        Err(err) => exit_for_error(&err.into()),
    };

    let outcome = match cli.command {
        Command::Daemon => daemon::run_daemon(settings),
        Command::Status(args) => status::run_status(settings, args.refresh),
        Command::Update(args) => update::run_update(settings, &args.file),
        Command::Backup => backup::run_backup(settings),
        Command::Restore(args) => restore::run_restore(settings, &args.snapshot_id),
    };
    if let Err(err) = outcome {
        exit_for_error(&err);
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
