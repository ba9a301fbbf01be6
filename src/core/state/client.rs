// src/core/state/client.rs

//! Contains state definitions related to client connections.

use super::registry::ConnId;
use bytes::Bytes;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Queue of serialized frames waiting to be written to one connection.
pub type OutboundSender = mpsc::Sender<Bytes>;
pub type OutboundReceiver = mpsc::Receiver<Bytes>;
pub type ClientMap = Arc<DashMap<ConnId, ClientHandle>>;

/// What other tasks need to reach a connection.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub addr: SocketAddr,
    pub created: Instant,
    pub outbound: OutboundSender,
}
