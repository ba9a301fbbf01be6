// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for connection resource management.

use crate::core::metrics;
use crate::core::state::{ConnId, ServerState};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// An RAII guard to ensure connection resources are always cleaned up when a
/// connection handler's scope is exited, whatever the reason.
pub struct ConnectionGuard {
    /// A shared reference to the server state.
    pub(crate) state: Arc<ServerState>,
    /// The connection this guard cleans up after.
    pub(crate) conn_id: ConnId,
    /// The network address of the client.
    pub(crate) addr: SocketAddr,
}

impl ConnectionGuard {
    /// Creates a new `ConnectionGuard`.
    pub(crate) fn new(state: Arc<ServerState>, conn_id: ConnId, addr: SocketAddr) -> Self {
        metrics::CONNECTED_CLIENTS.inc();
        Self {
            state,
            conn_id,
            addr,
        }
    }
}

impl Drop for ConnectionGuard {
    /// Removes the connection from the matchmaking tables, notifies its
    /// partner, and drops its outbound queue.
    fn drop(&mut self) {
        metrics::CONNECTED_CLIENTS.dec();
        debug!(
            "ConnectionGuard dropping, cleaning up resources for connection {}",
            self.addr
        );

        if let Some(partner) = self.state.disconnect(self.conn_id) {
            info!(
                "Client {} left its session; notified partner connection {}.",
                self.addr, partner
            );
        }

        match self.state.detach_client(self.conn_id) {
            Some(handle) => info!(
                "Client {} disconnected after {:.1?}.",
                self.addr,
                handle.created.elapsed()
            ),
            None => debug!(
                "Client {} was not in the global client map upon cleanup.",
                self.addr
            ),
        }
    }
}
