// src/core/state/core.rs

//! Defines the central `ServerState` struct, holding all shared server-wide state.

use super::client::{ClientHandle, ClientMap, OutboundReceiver};
use super::matchmaker::{ConnectionPhase, Matchmaker, MatchmakingStats};
use super::registry::{ConnId, MatchOutcome, WaitKey};
use crate::config::Config;
use crate::core::RelayError;
use crate::core::metrics;
use crate::core::protocol::{MessageKind, Registration, ServerMessage};
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// The central struct holding all shared, server-wide state.
///
/// Wrapped in an `Arc` and handed to every connection handler. The matchmaking
/// tables are private: callers only get the atomic operations below. Status
/// notifications are queued with `try_send` while the lock is held, which
/// never waits on a socket. Lock order is matchmaker, then the client map.
#[derive(Debug)]
pub struct ServerState {
    /// The resolved configuration the server was started with.
    pub config: Config,
    /// Every live connection, keyed by its connection id.
    pub clients: ClientMap,
    /// Registry and session table behind the single matchmaking lock.
    matchmaker: Mutex<Matchmaker>,
}

impl ServerState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            clients: Arc::new(DashMap::new()),
            matchmaker: Mutex::new(Matchmaker::new()),
        }
    }

    /// Makes a new connection reachable by other handlers and returns the
    /// receiving end of its outbound queue.
    pub fn attach_client(&self, conn: ConnId, addr: SocketAddr) -> OutboundReceiver {
        let (outbound, rx) = mpsc::channel(self.config.outbound_buffer);
        self.clients.insert(
            conn,
            ClientHandle {
                addr,
                created: Instant::now(),
                outbound,
            },
        );
        rx
    }

    pub fn detach_client(&self, conn: ConnId) -> Option<ClientHandle> {
        self.clients.remove(&conn).map(|(_, handle)| handle)
    }

    /// Registers `conn` and notifies whoever is affected.
    ///
    /// On a match both members are told they are connected; otherwise the
    /// registrant is told what it is waiting for. The notifications are queued
    /// before the matchmaking lock is released, so a partner's departure is
    /// always queued after them.
    pub fn register(
        &self,
        conn: ConnId,
        registration: Registration,
    ) -> Result<MatchOutcome, RelayError> {
        let mut matchmaker = self.matchmaker.lock();
        let outcome = matchmaker.register(conn, registration.clone())?;
        publish_gauges(&matchmaker);

        match outcome {
            MatchOutcome::Matched(partner) => {
                let connected = ServerMessage::connected();
                self.send_to(conn, &connected);
                self.send_to(partner, &connected);
                metrics::SESSIONS_FORMED_TOTAL.inc();
            }
            MatchOutcome::Queued => {
                self.send_to(conn, &ServerMessage::waiting(&registration));
            }
        }
        Ok(outcome)
    }

    pub fn find_partner(&self, conn: ConnId) -> Option<ConnId> {
        self.matchmaker.lock().find_partner(conn)
    }

    /// Forwards `payload` to the session partner of `from`, unchanged.
    ///
    /// Returns false if `from` has no partner or the partner's queue refused
    /// the message.
    pub fn relay(&self, from: ConnId, kind: MessageKind, payload: Bytes) -> bool {
        let Some(partner) = self.find_partner(from) else {
            metrics::MESSAGES_DROPPED_TOTAL
                .with_label_values(&["no_partner"])
                .inc();
            return false;
        };
        let delivered = self.enqueue(partner, payload);
        if delivered {
            metrics::MESSAGES_RELAYED_TOTAL
                .with_label_values(&[kind.as_ref()])
                .inc();
        }
        delivered
    }

    /// Removes `conn` from the matchmaking tables and tells its former
    /// partner, if any, that it left.
    pub fn disconnect(&self, conn: ConnId) -> Option<ConnId> {
        let mut matchmaker = self.matchmaker.lock();
        let partner = matchmaker.disconnect(conn);
        publish_gauges(&matchmaker);
        if let Some(partner) = partner {
            self.send_to(partner, &ServerMessage::partner_disconnected());
        }
        partner
    }

    /// Queues a server-originated message for `conn`.
    pub fn send_to(&self, conn: ConnId, message: &ServerMessage) -> bool {
        match message.to_bytes() {
            Ok(payload) => self.enqueue(conn, payload),
            Err(e) => {
                warn!("Failed to serialize message for connection {}: {}", conn, e);
                false
            }
        }
    }

    fn enqueue(&self, conn: ConnId, payload: Bytes) -> bool {
        // Clone the sender so the map shard is not locked while sending.
        let Some(outbound) = self
            .clients
            .get(&conn)
            .map(|entry| entry.value().outbound.clone())
        else {
            debug!("Connection {} is gone, dropping outbound message.", conn);
            metrics::MESSAGES_DROPPED_TOTAL
                .with_label_values(&["peer_gone"])
                .inc();
            return false;
        };

        match outbound.try_send(payload) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    "Outbound queue for connection {} is full, dropping message.",
                    conn
                );
                metrics::MESSAGES_DROPPED_TOTAL
                    .with_label_values(&["queue_full"])
                    .inc();
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Outbound queue for connection {} is closed.", conn);
                metrics::MESSAGES_DROPPED_TOTAL
                    .with_label_values(&["peer_gone"])
                    .inc();
                false
            }
        }
    }

    pub fn phase_of(&self, conn: ConnId) -> ConnectionPhase {
        self.matchmaker.lock().phase_of(conn)
    }

    pub fn registration_of(&self, conn: ConnId) -> Option<Registration> {
        self.matchmaker.lock().client_info(conn).cloned()
    }

    pub fn waiting_under(&self, key: &WaitKey) -> Vec<ConnId> {
        self.matchmaker.lock().waiting_under(key)
    }

    pub fn matchmaking_stats(&self) -> MatchmakingStats {
        self.matchmaker.lock().stats()
    }
}

fn publish_gauges(matchmaker: &Matchmaker) {
    let stats = matchmaker.stats();
    metrics::WAITING_CLIENTS.set(stats.waiting as f64);
    metrics::ACTIVE_SESSIONS.set(stats.sessions as f64);
}
