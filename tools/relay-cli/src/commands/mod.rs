//! CLI command implementations.

pub mod config;
pub mod install;
pub mod resolve;

use clap::{Args, Subcommand};

/// Arguments for the resolve command.
#[derive(Args)]
pub struct ResolveArgs {
    /// URLs or paths to resolve (e.g. /entries/app.js).
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Run the install transition first.
    #[arg(long)]
    pub install: bool,

    /// Print the metrics summary after resolving.
    #[arg(long)]
    pub metrics: bool,
}

/// Arguments for the install command.
#[derive(Args)]
pub struct InstallArgs {
    /// Also run the activate transition.
    #[arg(long)]
    pub activate: bool,
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration.
    Show,
    /// Initialize a new config file.
    Init {
        /// Origin base URL to write into the file.
        #[arg(long, default_value = "http://localhost:8080")]
        base_url: String,

        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Validate the configuration.
    Validate,
}
