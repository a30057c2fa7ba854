//! End-to-end tests: a started node over nullable store, peers and wallet.

use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tangle_crypto::{derive_address, keypair_from_seed};
use tangle_messages::{PeerMessage, RejectReason, ValidationRequest, ValidationVote, VoteVerdict};
use tangle_node::{ConsensusNode, NodeConfig, NodeError};
use tangle_nullables::{NullNetwork, NullStore, NullWallet};
use tangle_store::{ShardId, Shards};
use tangle_transactions::{OutputRef, Transaction, TransactionBuilder, TransactionStatus};
use tangle_types::{Address, Amount, NodeId, Timestamp, TransactionId};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn address(seed: u8) -> Address {
    derive_address(&keypair_from_seed(&[seed; 32]).public)
}

fn genesis() -> Transaction {
    TransactionBuilder::new(Timestamp::new(1))
        .output(address(1), Amount::new(1_000))
        .output(address(2), Amount::new(1_000))
        .build()
        .unwrap()
}

fn spend(source: &Transaction, position: u32, owner: u8, date: u64) -> Transaction {
    let amount = source.outputs[position as usize].amount;
    TransactionBuilder::new(Timestamp::new(date))
        .parent(source.id)
        .input(
            OutputRef::new(source.id, position),
            &keypair_from_seed(&[owner; 32]),
        )
        .output(address(9), amount)
        .build()
        .unwrap()
}

struct Fixture {
    genesis: Transaction,
    store: Arc<NullStore>,
    network: Arc<NullNetwork>,
    wallet: Arc<NullWallet>,
    node: ConsensusNode,
}

fn fixture(tweak: impl FnOnce(&mut NodeConfig)) -> Fixture {
    let genesis = genesis();
    let store = Arc::new(NullStore::new());
    store.insert_stable(genesis.clone());
    let network = Arc::new(NullNetwork::with_peers(&["a", "b", "c"]));
    let wallet = Arc::new(NullWallet::new());

    let mut config = NodeConfig::default();
    config.consensus.genesis_transaction_id = genesis.id;
    config.scheduler_interval_ms = 10;
    tweak(&mut config);

    let node = ConsensusNode::new(config, store.clone(), network.clone(), wallet.clone());
    Fixture {
        genesis,
        store,
        network,
        wallet,
        node,
    }
}

fn vote_frame(id: TransactionId, verdict: VoteVerdict) -> Vec<u8> {
    PeerMessage::ValidationVote(ValidationVote {
        transaction_id: id,
        verdict,
    })
    .to_bytes()
    .unwrap()
}

fn request_frame(id: TransactionId) -> Vec<u8> {
    PeerMessage::ValidationRequest(ValidationRequest { transaction_id: id })
        .to_bytes()
        .unwrap()
}

/// Answer the next `count` outgoing validation requests over the wire.
async fn answer(f: &Fixture, count: usize, verdict: VoteVerdict) {
    for _ in 0..count {
        let (peer, id) = f.network.next_request().await.unwrap();
        let reply = f
            .node
            .handle_peer_message(&peer, &vote_frame(id, verdict))
            .await
            .unwrap();
        assert!(reply.is_none());
    }
}

// ---------------------------------------------------------------------------
// Scheduling and voting
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn scheduler_loop_drives_a_pending_transaction_to_stable() {
    let mut f = fixture(|_| {});
    let tx = spend(&f.genesis, 0, 1, 10);
    f.store.insert(tx.clone());

    f.node.start().unwrap();
    answer(&f, 6, VoteVerdict::Valid).await;

    assert_eq!(f.store.status(&tx.id), Some(TransactionStatus::Stable));
    assert_eq!(f.wallet.updates(), vec![tx.addresses()]);

    let metrics = &f.node.metrics;
    assert_eq!(metrics.rounds_started.get(), 1);
    assert_eq!(metrics.votes_received.get(), 6);
    assert_eq!(metrics.outcomes_stable.get(), 1);
    assert_eq!(metrics.consensus_duration_ms.get_sample_count(), 1);

    f.node.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn gauges_follow_an_open_round() {
    let mut f = fixture(|_| {});
    let tx = spend(&f.genesis, 0, 1, 10);
    f.store.insert(tx.clone());

    f.node.start().unwrap();
    let (_, id) = f.network.next_request().await.unwrap();
    assert_eq!(id, tx.id);

    f.node.refresh_metrics().await;
    assert_eq!(f.node.metrics.active_rounds.get(), 1);
    assert_eq!(f.node.metrics.active_transactions.get(), 1);
    assert_eq!(f.node.metrics.active_leases.get(), 0);

    f.node.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn double_spend_votes_mark_the_transaction_double_spent() {
    let mut f = fixture(|c| c.consensus.parallel_process_max = 1);
    let tx = spend(&f.genesis, 1, 2, 10);
    f.store.insert(tx.clone());

    f.node.start().unwrap();
    answer(&f, 15, VoteVerdict::DoubleSpend).await;

    let stored = f.store.get(&tx.id).unwrap();
    assert_eq!(stored.status, TransactionStatus::Invalid);
    assert!(stored.is_double_spend);
    assert_eq!(f.node.metrics.outcomes_double_spend.get(), 1);

    f.node.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn transactions_are_scheduled_across_shards() {
    let genesis = genesis();
    let root = Arc::new(NullStore::new());
    root.insert_stable(genesis.clone());
    let wallet_shard = Arc::new(NullStore::new());
    let tx = spend(&genesis, 0, 1, 10);
    wallet_shard.insert(tx.clone());
    let shards = Shards::new()
        .with_shard(ShardId::new("root"), root.clone())
        .with_shard(ShardId::new("wallet"), wallet_shard.clone());

    let network = Arc::new(NullNetwork::with_peers(&["a", "b", "c"]));
    let mut config = NodeConfig::default();
    config.consensus.genesis_transaction_id = genesis.id;
    config.scheduler_interval_ms = 10;
    let mut node = ConsensusNode::new(
        config,
        Arc::new(shards),
        network.clone(),
        Arc::new(NullWallet::new()),
    );

    node.start().unwrap();
    for _ in 0..6 {
        let (peer, id) = network.next_request().await.unwrap();
        node.handle_peer_message(&peer, &vote_frame(id, VoteVerdict::Valid))
            .await
            .unwrap();
    }

    assert_eq!(wallet_shard.status(&tx.id), Some(TransactionStatus::Stable));
    assert_eq!(root.status(&genesis.id), Some(TransactionStatus::Stable));
    node.stop().await.unwrap();
}

#[tokio::test]
async fn vote_for_an_unknown_round_is_ignored() {
    let f = fixture(|_| {});
    let frame = vote_frame(TransactionId::new([4; 32]), VoteVerdict::Valid);
    let reply = f
        .node
        .handle_peer_message(&NodeId::from("z"), &frame)
        .await
        .unwrap();

    assert!(reply.is_none());
    assert_eq!(f.node.metrics.votes_ignored.get(), 1);
    assert_eq!(f.node.metrics.votes_received.get(), 0);
}

// ---------------------------------------------------------------------------
// Serving peers
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn validation_request_is_answered_then_voted() {
    let f = fixture(|_| {});
    let tx = spend(&f.genesis, 0, 1, 10);
    f.store.insert(tx.clone());
    let peer = NodeId::from("remote");

    let reply = f
        .node
        .handle_peer_message(&peer, &request_frame(tx.id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        PeerMessage::from_bytes(&reply).unwrap(),
        PeerMessage::ValidationStart(ValidationRequest { transaction_id: tx.id })
    );

    let again = f
        .node
        .handle_peer_message(&peer, &request_frame(tx.id))
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        PeerMessage::from_bytes(&again).unwrap(),
        PeerMessage::ValidationReject(r) if r.reason == RejectReason::DuplicateRequest
    ));

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(f.network.votes(), vec![(peer, tx.id, VoteVerdict::Valid)]);
}

#[tokio::test]
async fn garbage_frame_is_a_message_error() {
    let f = fixture(|_| {});
    let result = f
        .node
        .handle_peer_message(&NodeId::from("a"), &[0xff, 0xff, 0xff, 0xff, 0x01])
        .await;
    assert!(matches!(result, Err(NodeError::Message(_))));
}

#[tokio::test]
async fn sync_requests_are_left_to_the_sync_layer() {
    let f = fixture(|_| {});
    let frame = PeerMessage::SyncRequest(tangle_messages::SyncRequest {
        transaction_id: f.genesis.id,
    })
    .to_bytes()
    .unwrap();
    let reply = f
        .node
        .handle_peer_message(&NodeId::from("a"), &frame)
        .await
        .unwrap();
    assert!(reply.is_none());
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn start_twice_then_restart_after_stop_fail() {
    let mut f = fixture(|c| c.enable_metrics = true);

    f.node.start().unwrap();
    assert!(f.node.is_running());
    assert!(matches!(f.node.start(), Err(NodeError::AlreadyStarted)));

    f.node.stop().await.unwrap();
    assert!(!f.node.is_running());
    assert!(matches!(f.node.start(), Err(NodeError::Stopped)));
}

#[tokio::test(start_paused = true)]
async fn empty_ledger_stays_quiet() {
    let mut f = fixture(|_| {});
    f.node.start().unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert!(f.network.requests().is_empty());
    assert_eq!(f.node.metrics.rounds_started.get(), 0);
    f.node.stop().await.unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Arbitrary inbound frames never panic the node.
    #[test]
    fn arbitrary_frames_are_handled(bytes in prop::collection::vec(any::<u8>(), 0..96)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let f = fixture(|_| {});
            let _ = f.node.handle_peer_message(&NodeId::from("fuzz"), &bytes).await;
        });
    }
}
