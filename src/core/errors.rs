// src/core/errors.rs

//! Defines the primary error type for the relay server.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures while serving a client.
///
/// Only `Io` and `MessageTooLong` end a connection. Every other variant is a
/// server-side diagnostic: it is logged and the connection keeps reading.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Message of {len} bytes exceeds the {max} byte limit")]
    MessageTooLong { len: usize, max: usize },

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Message is not a JSON object")]
    NotAnObject,

    #[error("Invalid message format: missing type field")]
    MissingType,

    #[error("Unknown message type '{0}'")]
    UnknownType(String),

    #[error("Invalid registration: {0}")]
    InvalidRegistration(String),

    #[error("Invalid role '{0}'")]
    InvalidRole(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Connection {0} is already registered")]
    AlreadyRegistered(u64),
}

impl RelayError {
    /// Returns true if the error means the connection can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayError::Io(_) | RelayError::MessageTooLong { .. })
    }

    /// A short, stable label for the `messages_dropped_total` metric.
    pub fn drop_reason(&self) -> &'static str {
        match self {
            RelayError::Io(_) => "io",
            RelayError::MessageTooLong { .. } => "too_long",
            RelayError::InvalidJson(_) | RelayError::NotAnObject => "malformed",
            RelayError::MissingType | RelayError::UnknownType(_) => "bad_type",
            RelayError::InvalidRegistration(_) | RelayError::InvalidRole(_) => {
                "bad_registration"
            }
            RelayError::ProtocolViolation(_) => "protocol_violation",
            RelayError::AlreadyRegistered(_) => "duplicate_register",
        }
    }
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
impl Clone for RelayError {
    fn clone(&self) -> Self {
        match self {
            RelayError::Io(e) => RelayError::Io(Arc::clone(e)),
            RelayError::MessageTooLong { len, max } => RelayError::MessageTooLong {
                len: *len,
                max: *max,
            },
            RelayError::InvalidJson(s) => RelayError::InvalidJson(s.clone()),
            RelayError::NotAnObject => RelayError::NotAnObject,
            RelayError::MissingType => RelayError::MissingType,
            RelayError::UnknownType(s) => RelayError::UnknownType(s.clone()),
            RelayError::InvalidRegistration(s) => RelayError::InvalidRegistration(s.clone()),
            RelayError::InvalidRole(s) => RelayError::InvalidRole(s.clone()),
            RelayError::ProtocolViolation(s) => RelayError::ProtocolViolation(s.clone()),
            RelayError::AlreadyRegistered(id) => RelayError::AlreadyRegistered(*id),
        }
    }
}

impl PartialEq for RelayError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RelayError::Io(e1), RelayError::Io(e2)) => e1.kind() == e2.kind(),
            (
                RelayError::MessageTooLong { len: l1, max: m1 },
                RelayError::MessageTooLong { len: l2, max: m2 },
            ) => l1 == l2 && m1 == m2,
            (RelayError::InvalidJson(s1), RelayError::InvalidJson(s2)) => s1 == s2,
            (RelayError::UnknownType(s1), RelayError::UnknownType(s2)) => s1 == s2,
            (RelayError::InvalidRegistration(s1), RelayError::InvalidRegistration(s2)) => s1 == s2,
            (RelayError::InvalidRole(s1), RelayError::InvalidRole(s2)) => s1 == s2,
            (RelayError::ProtocolViolation(s1), RelayError::ProtocolViolation(s2)) => s1 == s2,
            (RelayError::AlreadyRegistered(a), RelayError::AlreadyRegistered(b)) => a == b,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for RelayError {
    fn from(e: std::io::Error) -> Self {
        RelayError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::InvalidJson(e.to_string())
    }
}
