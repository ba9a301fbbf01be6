// src/core/state/mod.rs

//! Defines the central `ServerState` struct and the matchmaking state behind it.

mod client;
mod core;
mod matchmaker;
mod registry;
mod sessions;

pub use client::*;
pub use core::ServerState;
pub use matchmaker::{ConnectionPhase, Matchmaker, MatchmakingStats};
pub use registry::{ConnId, MatchOutcome, Registry, WaitKey};
pub use sessions::SessionTable;
