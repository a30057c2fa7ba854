//! Serving validation requests from peers.

mod common;

use common::{spend, Ledger};
use std::sync::Arc;
use std::time::Duration;
use tangle_consensus::{AncestorValidator, ValidationResponder};
use tangle_messages::{RejectReason, ValidationReply, VoteVerdict};
use tangle_nullables::NullNetwork;
use tangle_types::{ConsensusParams, NodeId, TransactionId};

fn responder(ledger: &Ledger, network: &Arc<NullNetwork>) -> Arc<ValidationResponder> {
    let validator = Arc::new(AncestorValidator::new(
        &ledger.params,
        ledger.store.clone(),
        ledger.wallet.clone(),
    ));
    ValidationResponder::new(&ledger.params, validator, network.clone())
}

/// Let background validations run to completion.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn valid_transaction_gets_a_valid_vote() {
    let ledger = Ledger::new();
    let tx = spend(&ledger.genesis, 0, 1, 10, &[1_000]);
    ledger.store.insert(tx.clone());
    let network = Arc::new(NullNetwork::new());
    let responder = responder(&ledger, &network);
    let peer = NodeId::from("peer-a");

    assert_eq!(responder.handle_request(peer.clone(), tx.id), ValidationReply::Start);
    settle().await;

    assert_eq!(network.votes(), vec![(peer, tx.id, VoteVerdict::Valid)]);
    assert_eq!(responder.lease_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn failures_map_to_protocol_votes() {
    let ledger = Ledger::new();
    let overspend = spend(&ledger.genesis, 0, 1, 10, &[5_000]);
    ledger.store.insert(overspend.clone());
    let network = Arc::new(NullNetwork::new());
    let responder = responder(&ledger, &network);
    let unknown = TransactionId::new([9; 32]);

    responder.handle_request(NodeId::from("peer-a"), overspend.id);
    responder.handle_request(NodeId::from("peer-b"), unknown);
    settle().await;

    let mut votes = network.votes();
    votes.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        votes,
        vec![
            (NodeId::from("peer-a"), overspend.id, VoteVerdict::InvalidAmount),
            (NodeId::from("peer-b"), unknown, VoteVerdict::NotFound),
        ]
    );
    assert_eq!(
        ledger.wallet.requested(),
        vec![(unknown, Some(NodeId::from("peer-b")))]
    );
}

#[tokio::test(start_paused = true)]
async fn one_live_lease_per_peer() {
    let ledger = Ledger::new();
    let tx = spend(&ledger.genesis, 0, 1, 10, &[1_000]);
    let other = spend(&ledger.genesis, 1, 2, 10, &[1_000]);
    ledger.store.insert(tx.clone());
    ledger.store.insert(other.clone());
    let network = Arc::new(NullNetwork::new());
    let responder = responder(&ledger, &network);
    let peer = NodeId::from("peer-a");

    assert_eq!(responder.handle_request(peer.clone(), tx.id), ValidationReply::Start);
    assert_eq!(
        responder.handle_request(peer.clone(), tx.id),
        ValidationReply::Reject(RejectReason::DuplicateRequest)
    );
    assert_eq!(
        responder.handle_request(peer.clone(), other.id),
        ValidationReply::Reject(RejectReason::LeaseHeld)
    );

    settle().await;
    assert_eq!(responder.handle_request(peer, other.id), ValidationReply::Start);
}

#[tokio::test(start_paused = true)]
async fn lease_capacity_is_enforced() {
    let ledger = Ledger::with_params(ConsensusParams {
        validation_lease_max: 1,
        ..ConsensusParams::default()
    });
    let tx = spend(&ledger.genesis, 0, 1, 10, &[1_000]);
    ledger.store.insert(tx.clone());
    let network = Arc::new(NullNetwork::new());
    let responder = responder(&ledger, &network);

    assert_eq!(
        responder.handle_request(NodeId::from("peer-a"), tx.id),
        ValidationReply::Start
    );
    assert_eq!(
        responder.handle_request(NodeId::from("peer-b"), tx.id),
        ValidationReply::Reject(RejectReason::AtCapacity)
    );
    assert_eq!(responder.purge_stale_leases(), 0);
}
