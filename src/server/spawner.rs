// src/server/spawner.rs

//! Spawns the server's long-running background tasks.

use super::context::ServerContext;
use super::metrics_server;
use anyhow::Result;
use tracing::info;

/// Spawns all background tasks into the context's JoinSet.
pub async fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    if ctx.state.config.metrics.enabled {
        let metrics_state = ctx.state.clone();
        let shutdown_rx_metrics = ctx.shutdown_tx.subscribe();
        ctx.background_tasks.spawn(async move {
            metrics_server::run_metrics_server(metrics_state, shutdown_rx_metrics).await
        });
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }
    Ok(())
}
