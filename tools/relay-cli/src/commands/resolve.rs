//! Resolve URLs through a worker.

use anyhow::Result;
use futures::future::join_all;
use http::header::CONTENT_TYPE;
use relay_core::LifecycleEvent;
use relay_worker::Intercept;
use serde::Serialize;

use super::ResolveArgs;
use crate::context::Context;
use crate::output::{format_bytes, status_badge};

#[derive(Debug, Serialize)]
struct Resolved {
    url: String,
    intercepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    bytes: usize,
}

/// Run the resolve command.
pub async fn run(args: ResolveArgs, ctx: &Context) -> Result<()> {
    let worker = ctx.worker()?;

    if args.install {
        let spinner = ctx.output.spinner("Installing shell assets...");
        let result = worker.handle_event(LifecycleEvent::Install).await;
        spinner.finish_and_clear();
        result?;
        ctx.output.debug("Install transition complete");
    }

    let spinner = ctx.output.spinner(&format!("Resolving {} URL(s)...", args.urls.len()));
    let intercepts = join_all(args.urls.iter().map(|url| worker.handle_fetch(url))).await;
    spinner.finish_and_clear();

    let resolved: Vec<Resolved> = args
        .urls
        .iter()
        .zip(intercepts)
        .map(|(url, intercept)| match intercept {
            Intercept::Respond(response) => Resolved {
                url: url.clone(),
                intercepted: true,
                status: Some(response.status().as_u16()),
                content_type: response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from),
                bytes: response.body().len(),
            },
            Intercept::Passthrough => Resolved {
                url: url.clone(),
                intercepted: false,
                status: None,
                content_type: None,
                bytes: 0,
            },
        })
        .collect();

    let snapshot = worker.metrics().snapshot();

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({
            "resolved": resolved,
            "metrics": snapshot,
        }));
        return Ok(());
    }

    ctx.output.header("Resolved");
    ctx.output.table_row(&["STATUS", "TYPE", "SIZE", "URL"], &[8, 24, 10, 0]);
    for row in &resolved {
        let status = row
            .status
            .map(status_badge)
            .unwrap_or_else(|| "pass".to_string());
        let size = format_bytes(row.bytes as u64);
        ctx.output.table_row(
            &[
                status.as_str(),
                row.content_type.as_deref().unwrap_or("-"),
                size.as_str(),
                row.url.as_str(),
            ],
            &[8, 24, 10, 0],
        );
    }

    if args.metrics {
        ctx.output.header("Metrics");
        println!("{}", snapshot.to_summary());
    }

    Ok(())
}
