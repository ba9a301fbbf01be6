// tests/integration/lifecycle_test.rs

//! End-to-end tests for disconnects, shutdown, admission limits, and other
//! connection lifecycle events.

use super::test_helpers::TestServer;
use bytes::Bytes;
use serde_json::json;
use std::time::Duration;
use tutorlink::config::Config;
use tutorlink::core::protocol::{Role, ServerMessage, SessionStatus};
use tutorlink::core::state::{ConnectionPhase, WaitKey};

fn is_message(frame: &Bytes, expected: &ServerMessage) -> bool {
    serde_json::from_slice::<ServerMessage>(frame).is_ok_and(|m| &m == expected)
}

// ===== Disconnects =====

#[tokio::test]
async fn test_waiting_client_disconnect_empties_queue() {
    let server = TestServer::start().await;
    let (carol, _) = server.registered_client("Physics", "learn").await;
    assert_eq!(server.state.matchmaking_stats().queues, 1);

    drop(carol);
    server
        .wait_until(|state| {
            let stats = state.matchmaking_stats();
            stats.queues == 0 && stats.registered == 0
        })
        .await;
    assert!(
        server
            .state
            .waiting_under(&WaitKey::new("Physics", Role::Learn))
            .is_empty()
    );

    // A tutor arriving later must not be matched with the departed learner.
    let (_tutor, status) = server.registered_client("Physics", "teach").await;
    assert_eq!(
        status,
        ServerMessage::Status {
            status: SessionStatus::Waiting,
            message: "Waiting for a student in Physics...".to_string(),
        }
    );
}

#[tokio::test]
async fn test_partner_receives_exactly_one_disconnect_notice() {
    let server = TestServer::start().await;
    let (mut alice, _) = server.registered_client("Mathematics", "learn").await;
    let (bob, _) = server.registered_client("Mathematics", "teach").await;
    alice.recv_server_message().await;
    let alice_id = server.conn_id_of(&alice);

    drop(bob);
    assert_eq!(
        alice.recv_server_message().await,
        ServerMessage::partner_disconnected()
    );
    alice.expect_silence().await;
    assert_eq!(server.state.phase_of(alice_id), ConnectionPhase::PartnerLeft);
    assert_eq!(server.state.find_partner(alice_id), None);
}

#[tokio::test]
async fn test_client_whose_partner_left_stays_unpaired() {
    let server = TestServer::start().await;
    let (mut alice, _) = server.registered_client("Mathematics", "learn").await;
    let (bob, _) = server.registered_client("Mathematics", "teach").await;
    alice.recv_server_message().await;
    drop(bob);
    alice.recv_server_message().await;

    // Chat goes nowhere and a second registration is ignored.
    alice.chat("are you there?").await;
    alice.register("Mathematics", "learn").await;
    alice.expect_silence().await;

    // The learner is not back in the pool, so a new tutor waits.
    let (_tutor, status) = server.registered_client("Mathematics", "teach").await;
    assert_eq!(
        status,
        ServerMessage::Status {
            status: SessionStatus::Waiting,
            message: "Waiting for a student in Mathematics...".to_string(),
        }
    );
}

#[tokio::test]
async fn test_both_partners_leaving_at_once_cleans_up() {
    let server = TestServer::start().await;
    let (mut alice, _) = server.registered_client("Mathematics", "learn").await;
    let (bob, _) = server.registered_client("Mathematics", "teach").await;
    alice.recv_server_message().await;

    drop(alice);
    drop(bob);
    server
        .wait_until(|state| {
            let stats = state.matchmaking_stats();
            stats.sessions == 0 && stats.registered == 0 && state.clients.is_empty()
        })
        .await;
}

#[tokio::test]
async fn test_unregistered_client_disconnect_leaves_no_trace() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;
    client.chat("hello").await;
    client.expect_silence().await;
    assert_eq!(server.state.clients.len(), 1);

    drop(client);
    server.wait_until(|state| state.clients.is_empty()).await;
    assert_eq!(server.state.matchmaking_stats().registered, 0);
}

// ===== Framing limits =====

#[tokio::test]
async fn test_oversized_frame_closes_connection_and_notifies_partner() {
    let config = Config {
        max_message_size: 1024,
        ..Config::default()
    };
    let server = TestServer::with_config(config).await;
    let (mut alice, _) = server.registered_client("Mathematics", "learn").await;
    let (mut bob, _) = server.registered_client("Mathematics", "teach").await;
    alice.recv_server_message().await;

    let content = "x".repeat(2048);
    alice
        .write_bytes(format!(r#"{{"type":"chat","content":"{content}""#).as_bytes())
        .await;

    alice.expect_closed().await;
    assert_eq!(
        bob.recv_server_message().await,
        ServerMessage::partner_disconnected()
    );
}

#[tokio::test]
async fn test_frame_at_the_limit_is_relayed() {
    let config = Config {
        max_message_size: 1024,
        ..Config::default()
    };
    let server = TestServer::with_config(config).await;
    let (mut alice, _) = server.registered_client("Mathematics", "learn").await;
    let (mut bob, _) = server.registered_client("Mathematics", "teach").await;
    alice.recv_server_message().await;

    let envelope = json!({"type": "chat", "content": ""}).to_string();
    let content = "y".repeat(1024 - envelope.len());
    let frame = json!({"type": "chat", "content": content}).to_string();
    assert_eq!(frame.len(), 1024);

    alice.send_raw(&frame).await;
    assert_eq!(bob.recv_raw().await.as_ref(), frame.as_bytes());
}

// ===== Admission and timeouts =====

#[tokio::test]
async fn test_connection_beyond_max_clients_is_rejected() {
    let config = Config {
        max_clients: 1,
        ..Config::default()
    };
    let server = TestServer::with_config(config).await;
    let (first, _) = server.registered_client("Mathematics", "learn").await;

    let mut second = server.connect().await;
    assert_eq!(
        second.recv_server_message().await,
        ServerMessage::system("Server is full, try again later")
    );
    second.expect_closed().await;

    drop(first);
    server
        .wait_until(|_| server.permits.available_permits() == 1)
        .await;

    let (_third, status) = server.registered_client("Mathematics", "learn").await;
    assert_eq!(
        status,
        ServerMessage::Status {
            status: SessionStatus::Waiting,
            message: "Waiting for a tutor in Mathematics...".to_string(),
        }
    );
}

#[tokio::test]
async fn test_idle_connection_is_closed() {
    let config = Config {
        idle_timeout_secs: 1,
        ..Config::default()
    };
    let server = TestServer::with_config(config).await;
    let mut client = server.connect().await;

    let frames = client.expect_closed().await;
    assert!(frames.is_empty());
    server.wait_until(|state| state.clients.is_empty()).await;
}

#[tokio::test]
async fn test_activity_resets_idle_timer() {
    let config = Config {
        idle_timeout_secs: 1,
        ..Config::default()
    };
    let server = TestServer::with_config(config).await;
    let mut client = server.connect().await;

    for _ in 0..4 {
        tokio::time::sleep(Duration::from_millis(400)).await;
        client.send_json(json!({"type": "ping"})).await;
    }
    client.register("Mathematics", "learn").await;
    assert_eq!(
        client.recv_server_message().await,
        ServerMessage::Status {
            status: SessionStatus::Waiting,
            message: "Waiting for a tutor in Mathematics...".to_string(),
        }
    );
}

// ===== Shutdown =====

#[tokio::test]
async fn test_shutdown_notifies_and_closes_every_client() {
    let server = TestServer::start().await;
    let (mut alice, _) = server.registered_client("Mathematics", "learn").await;
    let (mut bob, _) = server.registered_client("Mathematics", "teach").await;
    alice.recv_server_message().await;
    let (mut carol, _) = server.registered_client("Physics", "learn").await;

    server.shutdown().await;

    let notice = ServerMessage::system("Server is shutting down");
    for client in [&mut alice, &mut bob, &mut carol] {
        let frames = client.expect_closed().await;
        assert!(
            frames.iter().any(|frame| is_message(frame, &notice)),
            "Expected a shutdown notice, got {frames:?}"
        );
    }
}

// ===== Concurrency =====

#[tokio::test]
async fn test_concurrent_registrations_pair_everyone() {
    const PAIRS: usize = 20;
    let server = TestServer::start().await;
    let addr = server.addr;

    let mut tasks = Vec::new();
    for i in 0..PAIRS * 2 {
        let role = if i % 2 == 0 { "learn" } else { "teach" };
        tasks.push(tokio::spawn(async move {
            let mut client = super::test_helpers::TestClient::connect(addr).await;
            client.register("Statistics", role).await;
            let mut status = client.recv_server_message().await;
            if matches!(
                status,
                ServerMessage::Status {
                    status: SessionStatus::Waiting,
                    ..
                }
            ) {
                status = client.recv_server_message().await;
            }
            assert_eq!(status, ServerMessage::connected());
            client
        }));
    }

    let mut clients = Vec::new();
    for task in tasks {
        clients.push(task.await.expect("Client task panicked"));
    }

    let stats = server.state.matchmaking_stats();
    assert_eq!(stats.sessions, PAIRS);
    assert_eq!(stats.waiting, 0);
    assert_eq!(stats.registered, PAIRS * 2);
}
