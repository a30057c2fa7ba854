//! Nullable network: scripted peers that record traffic instead of sending it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tangle_messages::{RejectReason, ValidationReply, VoteVerdict};
use tangle_network::{NetworkError, PeerInfo, PeerTransport};
use tangle_types::{NodeId, TransactionId};
use tokio::sync::mpsc;

/// How a scripted peer answers validation requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PeerScript {
    /// Accept and start validating.
    #[default]
    Start,
    Reject(RejectReason),
    /// The connection is gone.
    Closed,
    /// Fail with `node_timeout` straight away.
    Timeout,
    /// Never answer; the caller's own timeout fires.
    Hang,
}

/// A test transport with scripted peers.
///
/// Every validation request is also pushed onto a channel so a test can
/// await it with [`NullNetwork::next_request`] and answer with a vote.
pub struct NullNetwork {
    peers: Mutex<Vec<PeerInfo>>,
    scripts: Mutex<HashMap<NodeId, PeerScript>>,
    requests: Mutex<Vec<(NodeId, TransactionId)>>,
    request_tx: mpsc::UnboundedSender<(NodeId, TransactionId)>,
    request_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<(NodeId, TransactionId)>>,
    votes: Mutex<Vec<(NodeId, TransactionId, VoteVerdict)>>,
    syncs: Mutex<Vec<(TransactionId, Option<NodeId>)>>,
    disconnected: Mutex<Vec<NodeId>>,
    rotated: Mutex<Vec<NodeId>>,
}

impl NullNetwork {
    pub fn new() -> Self {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        Self {
            peers: Mutex::new(Vec::new()),
            scripts: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            request_tx,
            request_rx: tokio::sync::Mutex::new(request_rx),
            votes: Mutex::new(Vec::new()),
            syncs: Mutex::new(Vec::new()),
            disconnected: Mutex::new(Vec::new()),
            rotated: Mutex::new(Vec::new()),
        }
    }

    /// A network of ready peers that all accept requests.
    pub fn with_peers(names: &[&str]) -> Self {
        let network = Self::new();
        for name in names {
            network.add_peer(*name);
        }
        network
    }

    pub fn add_peer(&self, id: impl Into<NodeId>) {
        self.peers.lock().unwrap().push(PeerInfo::ready(id));
    }

    pub fn script(&self, peer: impl Into<NodeId>, script: PeerScript) {
        self.scripts.lock().unwrap().insert(peer.into(), script);
    }

    /// Wait for the next validation request sent to any peer.
    pub async fn next_request(&self) -> Option<(NodeId, TransactionId)> {
        self.request_rx.lock().await.recv().await
    }

    /// All validation requests so far (for assertions).
    pub fn requests(&self) -> Vec<(NodeId, TransactionId)> {
        self.requests.lock().unwrap().clone()
    }

    /// Votes we sent back to peers.
    pub fn votes(&self) -> Vec<(NodeId, TransactionId, VoteVerdict)> {
        self.votes.lock().unwrap().clone()
    }

    pub fn syncs(&self) -> Vec<(TransactionId, Option<NodeId>)> {
        self.syncs.lock().unwrap().clone()
    }

    pub fn disconnected(&self) -> Vec<NodeId> {
        self.disconnected.lock().unwrap().clone()
    }

    pub fn rotated(&self) -> Vec<NodeId> {
        self.rotated.lock().unwrap().clone()
    }
}

impl Default for NullNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerTransport for NullNetwork {
    async fn transaction_validation_request(
        &self,
        peer: &NodeId,
        transaction_id: &TransactionId,
    ) -> Result<ValidationReply, NetworkError> {
        self.requests
            .lock()
            .unwrap()
            .push((peer.clone(), *transaction_id));
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(peer)
            .copied()
            .unwrap_or_default();
        match script {
            PeerScript::Start => {
                let _ = self.request_tx.send((peer.clone(), *transaction_id));
                Ok(ValidationReply::Start)
            }
            PeerScript::Reject(reason) => Ok(ValidationReply::Reject(reason)),
            PeerScript::Closed => Err(NetworkError::NodeConnectionClosed(peer.clone())),
            PeerScript::Timeout => Err(NetworkError::NodeTimeout(peer.clone())),
            PeerScript::Hang => std::future::pending().await,
        }
    }

    async fn transaction_validation_response(
        &self,
        peer: &NodeId,
        transaction_id: &TransactionId,
        verdict: VoteVerdict,
    ) -> Result<(), NetworkError> {
        self.votes
            .lock()
            .unwrap()
            .push((peer.clone(), *transaction_id, verdict));
        Ok(())
    }

    async fn transaction_sync_request(
        &self,
        transaction_id: &TransactionId,
        peer: Option<&NodeId>,
    ) -> Result<(), NetworkError> {
        self.syncs
            .lock()
            .unwrap()
            .push((*transaction_id, peer.cloned()));
        Ok(())
    }

    async fn registered_clients(&self) -> Vec<PeerInfo> {
        let disconnected = self.disconnected.lock().unwrap().clone();
        self.peers
            .lock()
            .unwrap()
            .iter()
            .filter(|p| !disconnected.contains(&p.id))
            .cloned()
            .collect()
    }

    async fn disconnect(&self, peer: &NodeId) {
        self.disconnected.lock().unwrap().push(peer.clone());
    }

    async fn rotate_peer(&self, peer: &NodeId) {
        self.rotated.lock().unwrap().push(peer.clone());
    }
}
