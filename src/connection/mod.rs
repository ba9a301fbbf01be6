// src/connection/mod.rs

//! Manages the lifecycle of a single client TCP connection: frame decoding,
//! dispatch by message kind, relaying, and cleanup on disconnect.

mod guard;
mod handler;
mod session;

pub use guard::ConnectionGuard;
pub use handler::ConnectionHandler;
pub use session::SessionState;
