//! sitesync CLI - incremental atomic site deployment
//!
//! Usage: sitesync [FLAGS] <CONFIG>...

use clap::Parser;

mod cli;
mod commands;
mod ui;

use cli::Cli;

fn main() {
    let cli = Cli::parse();

    if let Err(err) = commands::deploy::cmd_deploy(&cli) {
        ui::print_error(&err);
        std::process::exit(err.exit_code());
    }
}
