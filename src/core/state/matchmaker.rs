// src/core/state/matchmaker.rs

//! Combines the registry and the session table into the single unit that the
//! server-wide matchmaking lock protects.

use super::registry::{ConnId, MatchOutcome, Registry, WaitKey};
use super::sessions::SessionTable;
use crate::core::RelayError;
use crate::core::protocol::Registration;

/// Where a connection stands in the matchmaking lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Unregistered,
    Waiting,
    Paired,
    /// Registered and once paired, but the partner has since disconnected.
    PartnerLeft,
}

/// A point-in-time view of the matchmaking tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchmakingStats {
    pub registered: usize,
    pub waiting: usize,
    /// Distinct (subject, role) keys with at least one waiter.
    pub queues: usize,
    pub sessions: usize,
}

/// Registry and session table. Every method is one atomic step when called
/// through the lock in [`super::ServerState`].
#[derive(Debug, Default)]
pub struct Matchmaker {
    registry: Registry,
    sessions: SessionTable,
}

impl Matchmaker {
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers `conn` and, when it is matched, records the new session in
    /// the same step.
    pub fn register(
        &mut self,
        conn: ConnId,
        registration: Registration,
    ) -> Result<MatchOutcome, RelayError> {
        let outcome = self.registry.register(conn, registration)?;
        if let MatchOutcome::Matched(partner) = outcome {
            self.sessions.insert(conn, partner);
        }
        Ok(outcome)
    }

    pub fn find_partner(&self, conn: ConnId) -> Option<ConnId> {
        self.sessions.find_partner(conn)
    }

    /// Forgets everything about `conn` and returns its former partner.
    pub fn disconnect(&mut self, conn: ConnId) -> Option<ConnId> {
        self.registry.deregister(conn);
        self.sessions.remove_pairs_containing(conn)
    }

    pub fn phase_of(&self, conn: ConnId) -> ConnectionPhase {
        if self.registry.client_info(conn).is_none() {
            ConnectionPhase::Unregistered
        } else if self.sessions.find_partner(conn).is_some() {
            ConnectionPhase::Paired
        } else if self.registry.is_waiting(conn) {
            ConnectionPhase::Waiting
        } else {
            ConnectionPhase::PartnerLeft
        }
    }

    pub fn client_info(&self, conn: ConnId) -> Option<&Registration> {
        self.registry.client_info(conn)
    }

    pub fn waiting_under(&self, key: &WaitKey) -> Vec<ConnId> {
        self.registry.waiting_under(key)
    }

    pub fn stats(&self) -> MatchmakingStats {
        MatchmakingStats {
            registered: self.registry.registered_len(),
            waiting: self.registry.waiting_len(),
            queues: self.registry.queue_count(),
            sessions: self.sessions.len(),
        }
    }
}
