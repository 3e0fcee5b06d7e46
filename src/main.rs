//! kvcache - A shard-per-core in-memory key-value cache engine
//!
//! Starts one event loop per core and runs until SIGINT/SIGTERM, then drains
//! every core and prints the final per-shard statistics.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kvcache::{merge_reports, Config, Engine};

/// Main entry point for the kvcache engine.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Start one core thread per configured core
/// 4. Wait for SIGINT/SIGTERM
/// 5. Drain all cores and log their final statistics
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" for this crate, overridable with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kvcache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting kvcache engine");

    let config = Config::from_env();
    info!(
        "Configuration loaded: {}",
        serde_json::to_string(&config).context("failed to serialize configuration")?
    );

    let engine = Arc::new(Engine::start(config).context("engine failed to start")?);
    info!("kvcache: online with {} cores.", engine.cores());

    shutdown_signal().await;

    // joining core threads blocks, keep it off the signal runtime
    let reports = tokio::task::spawn_blocking({
        let engine = Arc::clone(&engine);
        move || engine.shutdown()
    })
    .await
    .context("shutdown task failed")?;

    for report in &reports {
        info!(
            "Shard {} final stats: {}",
            report.core_id,
            serde_json::to_string(report).context("failed to serialize shard report")?
        );
    }
    let totals = merge_reports(&reports);
    info!(
        "Engine totals: {} (fabric: {})",
        serde_json::to_string(&totals).context("failed to serialize totals")?,
        serde_json::to_string(&engine.fabric_stats()).context("failed to serialize fabric stats")?
    );

    info!("Shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
