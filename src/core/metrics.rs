// src/core/metrics.rs

//! Defines and registers Prometheus metrics for server monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, TextEncoder, register_counter, register_counter_vec,
    register_gauge,
};

lazy_static! {
    // --- Server-wide Gauges ---
    /// The number of clients currently connected to the server.
    pub static ref CONNECTED_CLIENTS: Gauge =
        register_gauge!("tutorlink_connected_clients", "Number of currently connected clients.").unwrap();
    /// The number of registered clients waiting for a partner.
    pub static ref WAITING_CLIENTS: Gauge =
        register_gauge!("tutorlink_waiting_clients", "Number of registered clients waiting for a partner.").unwrap();
    /// The number of active two-party sessions.
    pub static ref ACTIVE_SESSIONS: Gauge =
        register_gauge!("tutorlink_active_sessions", "Number of active learner/tutor sessions.").unwrap();


    // --- Server-wide Counters ---
    /// The total number of connections accepted by the server since startup.
    pub static ref CONNECTIONS_RECEIVED_TOTAL: Counter =
        register_counter!("tutorlink_connections_received_total", "Total number of connections received.").unwrap();
    /// The total number of connections turned away because `max_clients` was reached.
    pub static ref CONNECTIONS_REJECTED_TOTAL: Counter =
        register_counter!("tutorlink_connections_rejected_total", "Total number of connections rejected at capacity.").unwrap();
    /// The total number of sessions formed since startup.
    pub static ref SESSIONS_FORMED_TOTAL: Counter =
        register_counter!("tutorlink_sessions_formed_total", "Total number of sessions formed.").unwrap();
    /// Messages forwarded to a session partner, labeled by message kind.
    pub static ref MESSAGES_RELAYED_TOTAL: CounterVec =
        register_counter_vec!("tutorlink_messages_relayed_total", "Total number of messages relayed, labeled by kind.", &["kind"]).unwrap();
    /// Messages that were not delivered, labeled by reason.
    pub static ref MESSAGES_DROPPED_TOTAL: CounterVec =
        register_counter_vec!("tutorlink_messages_dropped_total", "Total number of messages dropped, labeled by reason.", &["reason"]).unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}
