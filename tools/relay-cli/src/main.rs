//! Relay CLI - Command line tool for the relay resource worker.
//!
//! Commands:
//! - `relay resolve` - Resolve entry or shell URLs through a worker
//! - `relay install` - Run the install transition against the origin
//! - `relay config` - Manage configuration

mod commands;
mod config;
mod context;
mod output;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use relay_observability::{init_logging, LogFormat, LogLevel};

use commands::{ConfigArgs, InstallArgs, ResolveArgs};

/// Relay CLI - Exercise a relay resource worker against an origin
#[derive(Parser)]
#[command(name = "relay")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Use JSON output format
    #[arg(long, global = true)]
    json: bool,

    /// Log format (human or json)
    #[arg(long, global = true, default_value = "human")]
    log_format: LogFormat,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve URLs through a worker
    Resolve(ResolveArgs),

    /// Run the install transition and list the shell assets
    Install(InstallArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let output = output::Output::new(cli.verbose > 0, cli.json);
    if let Err(e) = init_logging(cli.log_format, LogLevel::from_verbosity(cli.verbose)) {
        output.warn(&format!("Logging disabled: {}", e));
    }

    let ctx = context::Context::load(cli.config.as_deref(), output)?;

    let result = match cli.command {
        Commands::Resolve(args) => commands::resolve::run(args, &ctx).await,
        Commands::Install(args) => commands::install::run(args, &ctx).await,
        Commands::Config(args) => commands::config::run(args, &ctx).await,
    };

    if let Err(e) = result {
        ctx.output.error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
