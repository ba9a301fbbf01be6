// src/server/context.rs

use crate::core::state::ServerState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;

/// Holds all the initialized state required to run the server's main loop.
pub struct ServerContext {
    pub state: Arc<ServerState>,
    pub listener: TcpListener,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
    pub acceptor: Option<TlsAcceptor>,
    /// One permit per connection being served; bounds concurrency at `max_clients`.
    pub connection_permits: Arc<Semaphore>,
}
