//! Run lifecycle transitions against the origin.

use anyhow::{Context as _, Result};
use chrono::Utc;
use relay_core::LifecycleEvent;
use serde::Serialize;

use super::InstallArgs;
use crate::context::Context;
use crate::output::format_bytes;

#[derive(Debug, Serialize)]
struct StaticEntry {
    key: String,
    content_type: String,
    bytes: usize,
}

/// Run the install command.
pub async fn run(args: InstallArgs, ctx: &Context) -> Result<()> {
    let worker = ctx.worker()?;

    let spinner = ctx.output.spinner("Installing shell assets...");
    let result = worker.handle_event(LifecycleEvent::Install).await;
    spinner.finish_and_clear();
    let mut phase = result.context("Install failed")?;

    if args.activate {
        phase = worker
            .handle_event(LifecycleEvent::Activate)
            .await
            .context("Activate failed")?;
    }

    let store = worker.storage().open(&worker.config().static_store)?;
    let mut entries = Vec::new();
    for key in store.keys().await? {
        if let Some(cached) = store.get(&key).await? {
            entries.push(StaticEntry {
                content_type: cached.content_type().to_str().unwrap_or("-").to_string(),
                bytes: cached.content_length(),
                key,
            });
        }
    }

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({
            "phase": phase,
            "installed_at": Utc::now().to_rfc3339(),
            "static": entries,
        }));
        return Ok(());
    }

    ctx.output.success(&format!(
        "Worker {} with {} shell asset(s)",
        phase,
        entries.len()
    ));
    for entry in &entries {
        ctx.output.list_item(&format!(
            "{} ({}, {})",
            entry.key,
            entry.content_type,
            format_bytes(entry.bytes as u64)
        ));
    }

    Ok(())
}
