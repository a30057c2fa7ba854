//! Serves validation requests from peers.
//!
//! A peer asking us to validate a transaction gets a lease, an immediate
//! `validation_start` reply, and later a vote sent through the transport.
//! One live lease per peer; the vote is only sent while the lease holds.

use crate::error::ConsensusError;
use crate::lease::{LeaseTicket, ValidationLeases};
use crate::validator::{AncestorValidator, ValidationContext};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tangle_messages::{ValidationReply, VoteVerdict};
use tangle_network::PeerTransport;
use tangle_types::{ConsensusParams, NodeId, TransactionId};
use tokio::time::Instant;

pub struct ValidationResponder {
    validator: Arc<AncestorValidator>,
    transport: Arc<dyn PeerTransport>,
    leases: Mutex<ValidationLeases>,
    proxy_time_limit: Duration,
}

impl ValidationResponder {
    pub fn new(
        params: &ConsensusParams,
        validator: Arc<AncestorValidator>,
        transport: Arc<dyn PeerTransport>,
    ) -> Arc<Self> {
        let proxy_time_limit = Duration::from_secs(params.proxy_time_limit_secs);
        Arc::new(Self {
            validator,
            transport,
            leases: Mutex::new(ValidationLeases::new(
                params.validation_lease_max,
                Duration::from_secs(params.validation_wait_time_max_secs),
            )),
            proxy_time_limit,
        })
    }

    fn leases(&self) -> MutexGuard<'_, ValidationLeases> {
        self.leases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lease_count(&self) -> usize {
        self.leases().len()
    }

    /// Answer a validation request. On `Start` the validation runs in the
    /// background and its vote follows through the transport.
    pub fn handle_request(self: &Arc<Self>, peer: NodeId, id: TransactionId) -> ValidationReply {
        let ticket = match self.leases().grant(&peer, id, Instant::now()) {
            Ok(ticket) => ticket,
            Err(reason) => {
                tracing::debug!(tx = %id, peer = %peer, %reason, "validation request rejected");
                return ValidationReply::Reject(reason);
            }
        };
        let this = Arc::clone(self);
        tokio::spawn(async move { this.serve(peer, id, ticket).await });
        ValidationReply::Start
    }

    async fn serve(&self, peer: NodeId, id: TransactionId, ticket: LeaseTicket) {
        let mut ctx = ValidationContext::for_peer(peer.clone(), self.proxy_time_limit, ticket.clone());
        let verdict = match self.validator.validate(id, &mut ctx).await {
            Ok(()) => Some(VoteVerdict::Valid),
            Err(ConsensusError::Rejected(r)) => {
                tracing::debug!(tx = %id, peer = %peer, cause = %r.cause, at = %r.transaction_id, "validation for peer failed");
                r.cause.verdict()
            }
            Err(e) => {
                tracing::warn!(tx = %id, peer = %peer, error = %e, "validation for peer aborted");
                None
            }
        };

        if let Some(verdict) = verdict {
            if ticket.is_live(Instant::now()) {
                if let Err(e) = self
                    .transport
                    .transaction_validation_response(&peer, &id, verdict)
                    .await
                {
                    tracing::debug!(tx = %id, peer = %peer, error = %e, "failed to send vote");
                }
            } else {
                tracing::debug!(tx = %id, peer = %peer, "lease lapsed, vote dropped");
            }
        }
        self.leases().release(&peer, &id);
    }

    /// Revoke leases whose peer never collected a vote in time.
    pub fn purge_stale_leases(&self) -> usize {
        let stale = self.leases().purge_stale(Instant::now());
        for (peer, id) in &stale {
            tracing::debug!(tx = %id, peer = %peer, "validation lease expired");
        }
        stale.len()
    }
}
