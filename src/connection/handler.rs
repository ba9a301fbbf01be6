// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of a client connection.

use super::guard::ConnectionGuard;
use super::session::SessionState;
use crate::core::metrics;
use crate::core::protocol::{Inbound, MessageCodec, MessageKind, Registration, ServerMessage};
use crate::core::state::{ConnId, MatchOutcome, OutboundReceiver, ServerState};
use crate::core::RelayError;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// Stands in for "no idle timeout" so the select loop keeps one shape.
const NO_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Manages the full lifecycle of a client connection.
///
/// The handler owns the socket. Other handlers reach this client only through
/// its outbound queue, which the select loop drains into the socket.
pub struct ConnectionHandler<S> {
    framed: Framed<S, MessageCodec>,
    outbound_rx: OutboundReceiver,
    addr: SocketAddr,
    state: Arc<ServerState>,
    conn_id: ConnId,
    shutdown_rx: broadcast::Receiver<()>,
    session: SessionState,
    // Declared last so cleanup runs after the socket is dropped.
    _guard: ConnectionGuard,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ConnectionHandler<S> {
    /// Creates a new `ConnectionHandler` and makes the connection reachable
    /// by other handlers.
    pub fn new(
        socket: S,
        addr: SocketAddr,
        state: Arc<ServerState>,
        conn_id: ConnId,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let codec = MessageCodec::new(state.config.max_message_size);
        let outbound_rx = state.attach_client(conn_id, addr);
        let guard = ConnectionGuard::new(state.clone(), conn_id, addr);
        Self {
            framed: Framed::new(socket, codec),
            outbound_rx,
            addr,
            state,
            conn_id,
            shutdown_rx,
            session: SessionState::new(),
            _guard: guard,
        }
    }

    /// The main event loop for the connection, handling incoming frames,
    /// queued outbound messages, and shutdown.
    pub async fn run(&mut self) -> Result<(), RelayError> {
        let idle_timeout = self.state.config.idle_timeout();
        let idle = tokio::time::sleep(idle_timeout.unwrap_or(NO_IDLE_TIMEOUT));
        tokio::pin!(idle);

        let result = loop {
            tokio::select! {
                // Prioritize shutdown, then deliver what is queued before reading more.
                biased;
                _ = self.shutdown_rx.recv() => {
                    info!("Connection handler for {} received shutdown signal.", self.addr);
                    if let Err(e) = self
                        .framed
                        .send(ServerMessage::system("Server is shutting down"))
                        .await
                    {
                        debug!("Failed to send shutdown notice to {}: {}", self.addr, e);
                    }
                    break Ok(());
                }
                Some(payload) = self.outbound_rx.recv() => {
                    if let Err(e) = self.framed.send(payload).await {
                        break Err(e);
                    }
                }
                result = self.framed.next() => {
                    match result {
                        Some(Ok(frame)) => {
                            if let Some(timeout) = idle_timeout {
                                idle.as_mut().reset(Instant::now() + timeout);
                            }
                            self.session.frames_received += 1;
                            match self.process_frame(frame) {
                                Ok(()) => {}
                                Err(e) if e.is_fatal() => break Err(e),
                                Err(e) => self.log_ignored(e),
                            }
                        }
                        // Framing errors leave the stream unusable.
                        Some(Err(e)) => break Err(e),
                        None => {
                            debug!("Connection from {} closed by peer.", self.addr);
                            break Ok(());
                        }
                    }
                }
                _ = &mut idle, if idle_timeout.is_some() => {
                    info!("Closing connection {} after {:?} without activity.", self.addr, idle_timeout.unwrap_or_default());
                    break Ok(());
                }
            }
        };

        debug!(
            "Connection {} finished: {} frames received, {} messages relayed.",
            self.conn_id, self.session.frames_received, self.session.messages_relayed
        );

        match result {
            Err(e) if is_normal_disconnect(&e) => {
                debug!("Connection from {} closed by peer: {}", self.addr, e);
                Ok(())
            }
            other => other,
        }
    }

    /// Decodes one frame and dispatches it by kind.
    ///
    /// Errors returned here are diagnostics only; the connection stays open.
    fn process_frame(&mut self, frame: Bytes) -> Result<(), RelayError> {
        let inbound = Inbound::parse(frame)?;
        debug!(
            "Connection {}: received '{}' message",
            self.conn_id,
            inbound.kind()
        );

        match inbound {
            Inbound::Register(registration) => self.handle_register(registration),
            Inbound::Relay { kind, payload } => self.handle_relay(kind, payload),
            Inbound::ServerOnly(kind) => Err(RelayError::ProtocolViolation(format!(
                "client sent server-only '{kind}' message"
            ))),
        }
    }

    fn handle_register(&mut self, registration: Registration) -> Result<(), RelayError> {
        if let Some(existing) = &self.session.registration {
            debug!(
                "Connection {} already registered for {} as {} ({:?}).",
                self.conn_id,
                existing.subject,
                existing.role,
                self.state.phase_of(self.conn_id)
            );
            return Err(RelayError::AlreadyRegistered(self.conn_id));
        }

        info!(
            "Client {} registered: subject={}, role={}",
            self.addr, registration.subject, registration.role
        );
        match self.state.register(self.conn_id, registration.clone())? {
            MatchOutcome::Matched(partner) => info!(
                "Matched connection {} with connection {} for {}: {} <-> {}",
                self.conn_id,
                partner,
                registration.subject,
                registration.role,
                registration.role.partner()
            ),
            MatchOutcome::Queued => info!(
                "Client {} waiting for: subject={}, looking for={}",
                self.addr,
                registration.subject,
                registration.role.partner()
            ),
        }
        self.session.registration = Some(registration);
        Ok(())
    }

    fn handle_relay(&mut self, kind: MessageKind, payload: Bytes) -> Result<(), RelayError> {
        if !self.session.is_registered() {
            return Err(RelayError::ProtocolViolation(format!(
                "'{kind}' message before register"
            )));
        }
        if self.state.relay(self.conn_id, kind, payload) {
            self.session.messages_relayed += 1;
            debug!("Connection {}: '{}' forwarded to partner.", self.conn_id, kind);
        } else {
            debug!(
                "Connection {}: no reachable partner, '{}' dropped.",
                self.conn_id, kind
            );
        }
        Ok(())
    }

    fn log_ignored(&self, e: RelayError) {
        warn!("Ignoring message from {}: {}", self.addr, e);
        metrics::MESSAGES_DROPPED_TOTAL
            .with_label_values(&[e.drop_reason()])
            .inc();
    }
}

/// Helper function to check for non-critical disconnection errors.
fn is_normal_disconnect(e: &RelayError) -> bool {
    matches!(e, RelayError::Io(arc_err) if matches!(
        arc_err.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionAborted
    ))
}
