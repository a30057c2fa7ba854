//! Validation leases held by remote peers.
//!
//! A peer that asks us to validate a transaction gets a lease for the
//! duration of that validation. One lease per peer; the lease expires after
//! the validation wait time, after which our late vote is no longer wanted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tangle_messages::RejectReason;
use tangle_types::{NodeId, TransactionId};
use tokio::time::Instant;

/// Liveness handle checked by the validator while it works for a peer.
#[derive(Clone, Debug)]
pub struct LeaseTicket {
    expires_at: Instant,
    revoked: Arc<AtomicBool>,
}

impl LeaseTicket {
    pub fn new(expires_at: Instant) -> Self {
        Self {
            expires_at,
            revoked: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_live(&self, now: Instant) -> bool {
        !self.revoked.load(Ordering::Acquire) && now < self.expires_at
    }

    pub fn revoke(&self) {
        self.revoked.store(true, Ordering::Release);
    }
}

#[derive(Clone, Debug)]
pub struct ValidationLease {
    pub transaction_id: TransactionId,
    pub granted_at: Instant,
    ticket: LeaseTicket,
}

#[derive(Debug)]
pub struct ValidationLeases {
    leases: HashMap<NodeId, ValidationLease>,
    capacity: usize,
    lifetime: Duration,
}

impl ValidationLeases {
    pub fn new(capacity: usize, lifetime: Duration) -> Self {
        Self {
            leases: HashMap::new(),
            capacity,
            lifetime,
        }
    }

    /// Grant `peer` a lease on `transaction_id`, or say why not.
    pub fn grant(
        &mut self,
        peer: &NodeId,
        transaction_id: TransactionId,
        now: Instant,
    ) -> Result<LeaseTicket, RejectReason> {
        if let Some(existing) = self.leases.get(peer) {
            if existing.ticket.is_live(now) {
                return Err(if existing.transaction_id == transaction_id {
                    RejectReason::DuplicateRequest
                } else {
                    RejectReason::LeaseHeld
                });
            }
            existing.ticket.revoke();
            self.leases.remove(peer);
        }

        if self.leases.len() >= self.capacity {
            self.purge_stale(now);
            if self.leases.len() >= self.capacity {
                return Err(RejectReason::AtCapacity);
            }
        }

        let ticket = LeaseTicket::new(now + self.lifetime);
        self.leases.insert(
            peer.clone(),
            ValidationLease {
                transaction_id,
                granted_at: now,
                ticket: ticket.clone(),
            },
        );
        Ok(ticket)
    }

    /// Release the lease if it is still the one for `transaction_id`.
    pub fn release(&mut self, peer: &NodeId, transaction_id: &TransactionId) -> bool {
        match self.leases.get(peer) {
            Some(lease) if lease.transaction_id == *transaction_id => {
                lease.ticket.revoke();
                self.leases.remove(peer);
                true
            }
            _ => false,
        }
    }

    /// Revoke and drop expired leases. Returns the (peer, transaction) pairs.
    pub fn purge_stale(&mut self, now: Instant) -> Vec<(NodeId, TransactionId)> {
        let stale: Vec<NodeId> = self
            .leases
            .iter()
            .filter(|(_, lease)| !lease.ticket.is_live(now))
            .map(|(peer, _)| peer.clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|peer| {
                let lease = self.leases.remove(&peer)?;
                lease.ticket.revoke();
                Some((peer, lease.transaction_id))
            })
            .collect()
    }

    pub fn get(&self, peer: &NodeId) -> Option<&ValidationLease> {
        self.leases.get(peer)
    }

    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }
}
