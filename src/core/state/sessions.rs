// src/core/state/sessions.rs

//! The table of active two-party sessions.

use super::registry::ConnId;

/// Active pairings. A connection appears in at most one pair.
#[derive(Debug, Default)]
pub struct SessionTable {
    pairs: Vec<(ConnId, ConnId)>,
}

impl SessionTable {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn insert(&mut self, a: ConnId, b: ConnId) {
        self.pairs.push((a, b));
    }

    /// Returns the other member of the pair containing `conn`, if any.
    pub fn find_partner(&self, conn: ConnId) -> Option<ConnId> {
        self.pairs.iter().find_map(|&(a, b)| {
            if a == conn {
                Some(b)
            } else if b == conn {
                Some(a)
            } else {
                None
            }
        })
    }

    /// Deletes every pair containing `conn` and returns the former partner.
    pub fn remove_pairs_containing(&mut self, conn: ConnId) -> Option<ConnId> {
        let partner = self.find_partner(conn);
        self.pairs.retain(|&(a, b)| a != conn && b != conn);
        partner
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
