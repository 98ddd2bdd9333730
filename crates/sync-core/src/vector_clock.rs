//! Vector clocks used to detect concurrent edits across disconnected clients.
//!
//! `A <= B` iff every key of A is <= the matching key of B (missing = 0).
//! `A` and `B` are concurrent iff neither dominates the other — that is
//! the only condition under which a true conflict exists (Testable
//! Property 5).

use crate::ids::ClientId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock(pub BTreeMap<ClientId, u64>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOrder {
    Equal,
    Before,
    After,
    Concurrent,
}

impl VectorClock {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, client: &ClientId) -> u64 {
        self.0.get(client).copied().unwrap_or(0)
    }

    /// Increment this clock's own entry for `client` and return the new clock.
    pub fn incremented(&self, client: &ClientId) -> Self {
        let mut next = self.clone();
        *next.0.entry(client.clone()).or_insert(0) += 1;
        next
    }

    /// `self <= other`: every entry of self is <= the matching entry of other.
    pub fn le(&self, other: &VectorClock) -> bool {
        self.0.keys().chain(other.0.keys()).all(|k| self.get(k) <= other.get(k))
    }

    pub fn compare(&self, other: &VectorClock) -> ClockOrder {
        let self_le_other = self.le(other);
        let other_le_self = other.le(self);
        match (self_le_other, other_le_self) {
            (true, true) => ClockOrder::Equal,
            (true, false) => ClockOrder::Before,
            (false, true) => ClockOrder::After,
            (false, false) => ClockOrder::Concurrent,
        }
    }

    pub fn is_concurrent_with(&self, other: &VectorClock) -> bool {
        matches!(self.compare(other), ClockOrder::Concurrent)
    }

    /// Pointwise max, used when merging two sides of a resolved conflict.
    pub fn merged_with(&self, other: &VectorClock) -> Self {
        let mut out = self.clone();
        for (k, v) in &other.0 {
            let entry = out.0.entry(k.clone()).or_insert(0);
            if *v > *entry {
                *entry = *v;
            }
        }
        out
    }
}
