//! Peer transport facade.

use crate::NetworkError;
use async_trait::async_trait;
use tangle_messages::{ValidationReply, VoteVerdict};
use tangle_types::{NodeId, TransactionId};

/// A connected peer as reported by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: NodeId,
    /// Handshake finished and the peer accepts validation traffic.
    pub ready: bool,
}

impl PeerInfo {
    pub fn ready(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            ready: true,
        }
    }
}

#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Ask `peer` to validate `transaction_id`. Resolves with the peer's
    /// immediate start/reject answer; the vote arrives later as a message.
    async fn transaction_validation_request(
        &self,
        peer: &NodeId,
        transaction_id: &TransactionId,
    ) -> Result<ValidationReply, NetworkError>;

    /// Send our verdict back to a peer that asked us to validate.
    async fn transaction_validation_response(
        &self,
        peer: &NodeId,
        transaction_id: &TransactionId,
        verdict: VoteVerdict,
    ) -> Result<(), NetworkError>;

    /// Ask one peer (or every peer when `None`) to push a transaction.
    async fn transaction_sync_request(
        &self,
        transaction_id: &TransactionId,
        peer: Option<&NodeId>,
    ) -> Result<(), NetworkError>;

    async fn registered_clients(&self) -> Vec<PeerInfo>;

    async fn disconnect(&self, peer: &NodeId);

    /// Replace a persistently unresponsive peer with a fresh connection.
    async fn rotate_peer(&self, peer: &NodeId);
}
