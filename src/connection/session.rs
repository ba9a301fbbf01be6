// src/connection/session.rs

//! Defines the state a connection handler keeps about its own client.

use crate::core::protocol::Registration;

/// Holds the state specific to a single client connection.
#[derive(Debug, Default)]
pub struct SessionState {
    /// The first valid registration the client sent. Never replaced.
    pub registration: Option<Registration>,
    /// Frames received, including malformed ones.
    pub frames_received: u64,
    /// Messages handed to the partner's outbound queue.
    pub messages_relayed: u64,
}

impl SessionState {
    pub(crate) fn new() -> Self {
        Default::default()
    }

    pub fn is_registered(&self) -> bool {
        self.registration.is_some()
    }
}
