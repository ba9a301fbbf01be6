// src/core/protocol/mod.rs

pub mod codec;
pub mod message;
pub use codec::{DEFAULT_MAX_MESSAGE_SIZE, MessageCodec};
pub use message::{Inbound, MessageKind, Registration, Role, ServerMessage, SessionStatus};
