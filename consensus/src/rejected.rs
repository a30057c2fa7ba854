//! Provisionally rejected transactions.
//!
//! Transactions whose consensus ran out of rounds, or whose validation needs
//! data we do not have yet, are parked here so the scheduler skips them for a
//! while. Entries expire after the retry delay; the oldest is evicted when
//! the registry is full.

use std::collections::{HashMap, VecDeque};
use tangle_types::{Timestamp, TransactionId};

#[derive(Debug)]
pub struct RejectedRegistry {
    entries: HashMap<TransactionId, Timestamp>,
    /// Insertion order, oldest first. May hold ids already removed.
    order: VecDeque<TransactionId>,
    capacity: usize,
    retry_after_secs: u64,
}

impl RejectedRegistry {
    pub fn new(capacity: usize, retry_after_secs: u64) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
            retry_after_secs,
        }
    }

    pub fn insert(&mut self, id: TransactionId, now: Timestamp) {
        if self.entries.insert(id, now).is_some() {
            self.order.retain(|x| *x != id);
        }
        self.order.push_back(id);

        while self.entries.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn contains(&self, id: &TransactionId, now: Timestamp) -> bool {
        self.entries
            .get(id)
            .is_some_and(|at| !at.has_expired(self.retry_after_secs, now))
    }

    pub fn remove(&mut self, id: &TransactionId) {
        if self.entries.remove(id).is_some() {
            self.order.retain(|x| x != id);
        }
    }

    /// Ids still inside their retry delay.
    pub fn ids(&self, now: Timestamp) -> Vec<TransactionId> {
        self.order
            .iter()
            .filter(|id| self.contains(id, now))
            .copied()
            .collect()
    }

    /// Drop expired entries. Returns how many were dropped.
    pub fn purge(&mut self, now: Timestamp) -> usize {
        let before = self.entries.len();
        let retry = self.retry_after_secs;
        self.entries.retain(|_, at| !at.has_expired(retry, now));
        let entries = &self.entries;
        self.order.retain(|id| entries.contains_key(id));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
