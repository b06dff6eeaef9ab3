//! Configuration management commands.

use std::fs;

use anyhow::{bail, Result};

use super::{ConfigArgs, ConfigCommand};
use crate::config::generate_default_config;
use crate::context::Context;

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => show_config(ctx),
        ConfigCommand::Init { base_url, force } => init_config(&base_url, force, ctx),
        ConfigCommand::Validate => validate_config(ctx),
    }
}

fn show_config(ctx: &Context) -> Result<()> {
    if ctx.output.is_json() {
        ctx.output.json(&ctx.config);
        return Ok(());
    }

    ctx.output.header("Current Configuration");
    match &ctx.config_path {
        Some(path) => ctx.output.kv("file", &path.display().to_string()),
        None => ctx.output.kv("file", "(defaults)"),
    }

    let origin = &ctx.config.origin;
    ctx.output.info("[origin]");
    ctx.output.kv("base_url", &origin.base_url);
    ctx.output.kv("timeout_ms", &origin.timeout_ms.to_string());

    let worker = &ctx.config.worker;
    ctx.output.info("[worker]");
    ctx.output.kv("entries_prefix", &worker.entries_prefix);
    ctx.output.kv("resources_prefix", &worker.resources_prefix);
    ctx.output.kv("static_store", &worker.static_store);
    ctx.output.kv("resources_store", &worker.resources_store);
    ctx.output.kv("shell_assets", &worker.shell_assets.join(", "));
    ctx.output.kv("shell_routes", &worker.shell_routes.join(", "));
    ctx.output.kv("body_read_timeout_ms", &worker.body_read_timeout_ms.to_string());
    ctx.output.kv("style_import_timeout_ms", &worker.style_import_timeout_ms.to_string());
    ctx.output.kv("module_load_timeout_ms", &worker.module_load_timeout_ms.to_string());
    ctx.output.kv("carrier_selector", &worker.carrier_selector);

    Ok(())
}

fn init_config(base_url: &str, force: bool, ctx: &Context) -> Result<()> {
    let config_path = ctx.cwd.join("relay.toml");

    if config_path.exists() && !force {
        bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    fs::write(&config_path, generate_default_config(base_url))?;
    ctx.output.success(&format!("Created: {}", config_path.display()));

    Ok(())
}

fn validate_config(ctx: &Context) -> Result<()> {
    ctx.config.validate()?;
    ctx.output.success("Configuration is valid");
    Ok(())
}
