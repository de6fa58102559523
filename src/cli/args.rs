use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "poolvault", version, about = "Pool backup and restore orchestrator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Connect and run the backup scheduler until signalled.
    Daemon,
    /// Print configuration summary and cycle status.
    Status(StatusArgs),
    /// Apply a service configuration file.
    Update(UpdateArgs),
    /// Run one backup cycle now, subject to the maintenance windows.
    Backup,
    /// Replace the pool contents with a repository snapshot.
    Restore(RestoreArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// Query the repository for its current snapshot list.
    #[arg(long)]
    pub refresh: bool,
}

#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    #[arg(long)]
    pub file: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct RestoreArgs {
    pub snapshot_id: String,
}
