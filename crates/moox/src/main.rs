mod cli;
mod commands;
mod error;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use moox_core::{Coordinator, FileStateStore, TrackerConfig};

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let (config, profile_name) = build_tracker_config(&cli.global)?;

    match cli.command {
        Command::Check => commands::check::run(&config).await,
        Command::Devices => {
            let coordinator = new_coordinator(config, &profile_name)?;
            commands::devices::run(&coordinator).await
        }
        Command::Watch => {
            let coordinator = new_coordinator(config, &profile_name)?;
            commands::watch::run(coordinator).await
        }
    }
}

/// Build a `TrackerConfig` from the config file, profile, and CLI overrides.
fn build_tracker_config(global: &GlobalOpts) -> Result<(TrackerConfig, String), CliError> {
    let cfg = moox_config::load_config_or_default();
    let profile_name = moox_config::active_profile_name(global.profile.as_deref(), &cfg);

    let mut profile = cfg
        .profiles
        .get(&profile_name)
        .cloned()
        .unwrap_or_default();

    // CLI flags and environment override the profile.
    if let Some(ref host) = global.host {
        profile.host = host.clone();
    }
    if let Some(port) = global.port {
        profile.port = port;
    }
    if let Some(ref email) = global.email {
        profile.email = email.clone();
    }
    if let Some(interval) = global.interval {
        profile.poll_interval = interval;
    }
    if global.insecure {
        profile.verify_ssl = false;
    }
    if global.no_ssl {
        profile.ssl = false;
    }

    let config = moox_config::profile_to_tracker_config(&profile, &profile_name)?;
    Ok((config, profile_name))
}

fn new_coordinator(config: TrackerConfig, profile_name: &str) -> Result<Coordinator, CliError> {
    let store = Arc::new(FileStateStore::new(moox_config::state_dir(profile_name)));
    Coordinator::new(config, store).map_err(CliError::from)
}
