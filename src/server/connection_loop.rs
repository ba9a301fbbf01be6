// src/server/connection_loop.rs

//! Contains the main server loop for accepting connections and handling graceful shutdown.

use super::context::ServerContext;
use crate::connection::ConnectionHandler;
use crate::core::metrics;
use crate::core::protocol::{MessageCodec, ServerMessage};
use crate::core::state::{ConnId, ServerState};
use futures::SinkExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{OwnedSemaphorePermit, broadcast};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

/// How long connection handlers get to say goodbye once shutdown starts.
const CLIENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// The main server loop that accepts connections and handles graceful shutdown.
pub async fn run(mut ctx: ServerContext) {
    let mut conn_id_counter: ConnId = 0;
    let mut client_tasks = JoinSet::new();
    let mut shutdown_rx = ctx.shutdown_tx.subscribe();

    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to create SIGINT stream");
    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to create SIGTERM stream");

    loop {
        tokio::select! {
            biased;

            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown.");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown.");
                break;
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown requested, initiating graceful shutdown.");
                break;
            }

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            },

            res = ctx.listener.accept() => {
                match res {
                    Ok((socket, addr)) => {
                        info!("New connection from {}", addr);
                        metrics::CONNECTIONS_RECEIVED_TOTAL.inc();

                        conn_id_counter = conn_id_counter.wrapping_add(1);
                        let conn_id = conn_id_counter;
                        // A connection without a permit is told the server is full and closed.
                        let permit = ctx.connection_permits.clone().try_acquire_owned().ok();
                        let state = ctx.state.clone();
                        let shutdown_rx = ctx.shutdown_tx.subscribe();
                        let acceptor = ctx.acceptor.clone();

                        client_tasks.spawn(async move {
                            serve_socket(socket, addr, acceptor, state, conn_id, shutdown_rx, permit).await;
                        });
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                }
            },

            Some(res) = client_tasks.join_next() => {
                if let Err(e) = res
                    && e.is_panic()
                {
                    error!("A client handler panicked: {e:?}");
                }
            },
        }
    }

    info!("Shutting down. Sending signal to all tasks.");
    if ctx.shutdown_tx.send(()).is_err() {
        debug!("No task was listening for the shutdown signal.");
    }

    if tokio::time::timeout(CLIENT_DRAIN_TIMEOUT, async {
        while client_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for client connections to close.");
    }
    client_tasks.shutdown().await;
    info!("All client connections closed.");

    info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(Duration::from_secs(10), async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
    };
    info!("Server shutdown complete.");
}

/// Completes the TLS handshake if configured, then either serves the
/// connection or turns it away when no permit was available.
async fn serve_socket(
    socket: TcpStream,
    addr: SocketAddr,
    acceptor: Option<TlsAcceptor>,
    state: Arc<ServerState>,
    conn_id: ConnId,
    shutdown_rx: broadcast::Receiver<()>,
    permit: Option<OwnedSemaphorePermit>,
) {
    match acceptor {
        Some(acceptor) => match acceptor.accept(socket).await {
            Ok(tls_stream) => {
                debug!("TLS handshake successful for {addr}");
                serve_stream(tls_stream, addr, state, conn_id, shutdown_rx, permit).await;
            }
            Err(e) => warn!("TLS handshake error for {addr}: {e}"),
        },
        None => serve_stream(socket, addr, state, conn_id, shutdown_rx, permit).await,
    }
}

async fn serve_stream<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    addr: SocketAddr,
    state: Arc<ServerState>,
    conn_id: ConnId,
    shutdown_rx: broadcast::Receiver<()>,
    permit: Option<OwnedSemaphorePermit>,
) {
    let Some(_permit) = permit else {
        warn!(
            "Rejecting connection from {}: max_clients ({}) reached.",
            addr, state.config.max_clients
        );
        metrics::CONNECTIONS_REJECTED_TOTAL.inc();
        let mut framed = Framed::new(stream, MessageCodec::default());
        if let Err(e) = framed
            .send(ServerMessage::system("Server is full, try again later"))
            .await
        {
            debug!("Failed to send capacity notice to {}: {}", addr, e);
        }
        return;
    };

    let mut handler = ConnectionHandler::new(stream, addr, state, conn_id, shutdown_rx);
    if let Err(e) = handler.run().await {
        warn!("Connection from {} terminated unexpectedly: {}", addr, e);
    }
}
