//! The deploy command: load config files, run every site in order.

use sitesync::deploy::{DeployOptions, Deployer};
use sitesync::server::{resolve_credentials, server_for_url, Server, TerminalPrompt};
use sitesync::{Config, SitesyncResult};

use crate::cli::Cli;
use crate::ui::ConsoleLogger;

/// Default config file when none is given on the command line.
const DEFAULT_CONFIG: &str = "deploy.ini";

/// Run every site of every config file given on the command line.
/// The first failure stops the run and becomes the exit code.
pub fn cmd_deploy(cli: &Cli) -> SitesyncResult<()> {
    let configs = if cli.configs.is_empty() {
        vec![std::path::PathBuf::from(DEFAULT_CONFIG)]
    } else {
        cli.configs.clone()
    };
    for config_path in &configs {
        let sites = Config::load_all(config_path)?;
        for mut config in sites {
            config.test_mode |= cli.test;
            run_site(&config, cli)?;
        }
    }
    Ok(())
}

fn run_site(config: &Config, cli: &Cli) -> SitesyncResult<()> {
    let mut logger = ConsoleLogger::new(cli.verbose, cli.no_progress);
    logger.section(&config.section);

    // Prompt once, before any session (workers clone the resolved URL).
    let url = resolve_credentials(&config.remote, &TerminalPrompt)?;
    let factory = move || -> SitesyncResult<Box<dyn Server>> { Ok(server_for_url(&url, config)) };

    let options = DeployOptions {
        test_mode: config.test_mode,
        redeploy: cli.full,
        workers: cli.workers.max(1),
        force_unlock: cli.force_unlock,
    };

    let deployer = Deployer::new(config, options, &factory);
    let summary = deployer.run(&mut logger)?;
    logger.summary(&summary);
    Ok(())
}
