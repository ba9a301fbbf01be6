// src/core/mod.rs

//! The central module containing the wire protocol, the matchmaking state, and
//! the shared error and metrics definitions of TutorLink.

pub mod errors;
pub mod metrics;
pub mod protocol;
pub mod state;

pub use errors::RelayError;
pub use protocol::{Inbound, MessageKind, ServerMessage};
