use std::path::PathBuf;

use clap::Parser;

/// sitesync - incremental atomic site deployment
#[derive(Parser, Debug)]
#[command(name = "sitesync")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "Exit codes: 0 success, 1 failure, 2 config error, 3 deployment lock.")]
pub struct Cli {
    /// Deployment config files, each describing one or more sites
    /// (./deploy.ini when omitted)
    #[arg(value_name = "CONFIG")]
    pub configs: Vec<PathBuf>,

    /// Show what would change without deploying
    #[arg(short = 't', long = "test")]
    pub test: bool,

    /// Re-upload every file regardless of the remote manifest
    #[arg(long)]
    pub full: bool,

    /// Disable the progress display
    #[arg(long)]
    pub no_progress: bool,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Number of concurrent upload workers
    #[arg(long, default_value_t = 10, value_name = "N")]
    pub workers: usize,

    /// Break a stale deployment lock left behind by a crashed run
    #[arg(long)]
    pub force_unlock: bool,
}
