//! Clap derive structures for the `moox` CLI.

use clap::{Args, Parser, Subcommand};

/// moox -- watch a MOOX Track fleet from the command line
#[derive(Debug, Parser)]
#[command(
    name = "moox",
    version,
    about = "Track a MOOX fleet from the command line",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Tracker profile to use
    #[arg(long, short = 'p', env = "MOOX_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Server host (overrides profile)
    #[arg(long, env = "MOOX_HOST", global = true)]
    pub host: Option<String>,

    /// Server port (overrides profile)
    #[arg(long, env = "MOOX_PORT", global = true)]
    pub port: Option<u16>,

    /// Account email (overrides profile)
    #[arg(long, env = "MOOX_EMAIL", global = true)]
    pub email: Option<String>,

    /// Poll interval in seconds (floor 30)
    #[arg(long, env = "MOOX_INTERVAL", global = true)]
    pub interval: Option<u64>,

    /// Skip TLS certificate verification
    #[arg(long, short = 'k', env = "MOOX_INSECURE", global = true)]
    pub insecure: bool,

    /// Use plain HTTP instead of HTTPS
    #[arg(long, env = "MOOX_NO_SSL", global = true)]
    pub no_ssl: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate the configured credentials against the server
    Check,

    /// One-shot poll: list devices with their current state
    Devices,

    /// Poll continuously, printing snapshot updates and events
    Watch,
}
