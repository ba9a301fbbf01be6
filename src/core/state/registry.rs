// src/core/state/registry.rs

//! The subject/role matchmaking index: who is registered, and who is waiting.

use crate::core::RelayError;
use crate::core::protocol::{Registration, Role};
use std::collections::{HashMap, VecDeque};

/// Process-unique identifier of an accepted connection.
pub type ConnId = u64;

/// The key an unmatched connection waits under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WaitKey {
    pub subject: String,
    pub role: Role,
}

impl WaitKey {
    pub fn new(subject: impl Into<String>, role: Role) -> Self {
        Self {
            subject: subject.into(),
            role,
        }
    }
}

impl From<&Registration> for WaitKey {
    fn from(registration: &Registration) -> Self {
        WaitKey::new(registration.subject.clone(), registration.role)
    }
}

/// The result of a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The registrant was paired with this waiting connection.
    Matched(ConnId),
    /// No compatible peer was waiting; the registrant now waits.
    Queued,
}

/// Registration metadata plus the FIFO waiting pool.
///
/// Not synchronized on its own. It is only ever mutated through
/// [`super::Matchmaker`] under the server-wide matchmaking lock.
#[derive(Debug, Default)]
pub struct Registry {
    waiting: HashMap<WaitKey, VecDeque<ConnId>>,
    clients: HashMap<ConnId, Registration>,
}

impl Registry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers `conn`, pairing it with the oldest compatible waiter if there
    /// is one and queueing it otherwise.
    pub fn register(
        &mut self,
        conn: ConnId,
        registration: Registration,
    ) -> Result<MatchOutcome, RelayError> {
        if self.clients.contains_key(&conn) {
            return Err(RelayError::AlreadyRegistered(conn));
        }

        let partner_key = WaitKey::new(registration.subject.clone(), registration.role.partner());
        let outcome = match self.pop_waiter(&partner_key) {
            Some(partner) => MatchOutcome::Matched(partner),
            None => {
                self.waiting
                    .entry(WaitKey::from(&registration))
                    .or_default()
                    .push_back(conn);
                MatchOutcome::Queued
            }
        };
        self.clients.insert(conn, registration);
        Ok(outcome)
    }

    /// Removes `conn`'s registration and, if it was still waiting, its queue
    /// entry. Unknown connections are ignored.
    pub fn deregister(&mut self, conn: ConnId) -> Option<Registration> {
        let registration = self.clients.remove(&conn)?;
        let key = WaitKey::from(&registration);
        if let Some(queue) = self.waiting.get_mut(&key) {
            queue.retain(|waiting| *waiting != conn);
            if queue.is_empty() {
                self.waiting.remove(&key);
            }
        }
        Some(registration)
    }

    fn pop_waiter(&mut self, key: &WaitKey) -> Option<ConnId> {
        let queue = self.waiting.get_mut(key)?;
        let head = queue.pop_front();
        if queue.is_empty() {
            self.waiting.remove(key);
        }
        head
    }

    pub fn client_info(&self, conn: ConnId) -> Option<&Registration> {
        self.clients.get(&conn)
    }

    pub fn is_waiting(&self, conn: ConnId) -> bool {
        self.clients.get(&conn).is_some_and(|registration| {
            self.waiting
                .get(&WaitKey::from(registration))
                .is_some_and(|queue| queue.contains(&conn))
        })
    }

    /// The connections waiting under `key`, oldest first.
    pub fn waiting_under(&self, key: &WaitKey) -> Vec<ConnId> {
        self.waiting
            .get(key)
            .map(|queue| queue.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Total number of waiting connections across all keys.
    pub fn waiting_len(&self) -> usize {
        self.waiting.values().map(VecDeque::len).sum()
    }

    /// Number of distinct keys with at least one waiter.
    pub fn queue_count(&self) -> usize {
        self.waiting.len()
    }

    pub fn registered_len(&self) -> usize {
        self.clients.len()
    }
}
