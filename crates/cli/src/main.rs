use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

mod plan;

use plan::Plan;

#[derive(Parser, Debug)]
#[command(name = "hush")]
#[command(about = "Run a dependency-ordered graceful shutdown plan", long_about = None)]
struct Args {
    /// Path to the shutdown plan
    #[arg(short, long, default_value = "hush.toml")]
    plan: PathBuf,

    /// Override the plan's shutdown timeout
    #[arg(long, env = "HUSH_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Trigger the shutdown after this delay instead of waiting for SIGINT/SIGTERM
    #[arg(long)]
    trigger_after_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hush=info,hush_core=info".into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    let mut plan = Plan::load(&args.plan)?;
    if let Some(timeout_ms) = args.timeout_ms {
        plan.shutdown.timeout_ms = timeout_ms;
    }

    let shutdown = plan.build()?;
    tracing::info!(
        services = shutdown.node_names().len(),
        closes_last = ?shutdown.roots(),
        timeout_ms = plan.shutdown.timeout_ms,
        "Shutdown plan registered"
    );

    let _signals = shutdown
        .listen_for_signals()
        .context("Failed to install signal handlers")?;

    match args.trigger_after_ms {
        Some(delay) => {
            let trigger = shutdown.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                trigger.trigger().await;
            });
        }
        None => tracing::info!("Waiting for SIGINT/SIGTERM, send it twice to force stop"),
    }

    let outcome = shutdown.wait().await;
    tracing::info!(?outcome, "Shutdown finished");

    outcome.into_result().context("Graceful shutdown did not complete")?;

    Ok(())
}
