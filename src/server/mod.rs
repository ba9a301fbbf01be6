// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;

mod connection_loop;
mod context;
mod initialization;
mod metrics_server;
mod spawner;

pub use context::ServerContext;
pub use initialization::{setup, setup_with_listener};

/// The main server startup function, orchestrating all setup phases.
pub async fn run(config: Config) -> Result<()> {
    // 1. Initialize server state, listener, TLS, etc.
    let server_context = setup(config).await?;

    // 2. Spawn background tasks and serve until shutdown.
    serve(server_context).await
}

/// Spawns background tasks and runs the accept loop on an initialized context.
/// Returns once a shutdown signal has been handled.
pub async fn serve(mut server_context: ServerContext) -> Result<()> {
    spawner::spawn_all(&mut server_context).await?;
    connection_loop::run(server_context).await;
    Ok(())
}
