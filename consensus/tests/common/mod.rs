//! Shared ledger fixtures for consensus integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use tangle_consensus::{ConsensusEvent, Coordinator, EventBus, ValidationScheduler};
use tangle_crypto::{derive_address, keypair_from_seed};
use tangle_nullables::{NullNetwork, NullStore, NullWallet};
use tangle_transactions::{OutputRef, Transaction, TransactionBuilder};
use tangle_types::{Address, Amount, ConsensusParams, KeyPair, Timestamp};
use tangle_utils::MutexManager;

pub fn keypair(seed: u8) -> KeyPair {
    keypair_from_seed(&[seed; 32])
}

pub fn address(seed: u8) -> Address {
    derive_address(&keypair(seed).public)
}

/// Genesis paying 1 000 to each of the first `outputs` seeds.
pub fn genesis(outputs: u8) -> Transaction {
    let mut builder = TransactionBuilder::new(Timestamp::new(1));
    for seed in 1..=outputs {
        builder = builder.output(address(seed), Amount::new(1_000));
    }
    builder.build().unwrap()
}

/// Spend output `position` of `source`, owned by `owner`, into `amounts`
/// paid to seed 200.
pub fn spend(source: &Transaction, position: u32, owner: u8, date: u64, amounts: &[u64]) -> Transaction {
    let kp = keypair(owner);
    let mut builder = TransactionBuilder::new(Timestamp::new(date))
        .parent(source.id)
        .input(OutputRef::new(source.id, position), &kp);
    for amount in amounts {
        builder = builder.output(address(200), Amount::new(*amount));
    }
    builder.build().unwrap()
}

/// Spend every output of `source` owned by seed 200 on to seed 200 again.
pub fn respend(source: &Transaction, date: u64) -> Transaction {
    let kp = keypair(200);
    let mut builder = TransactionBuilder::new(Timestamp::new(date)).parent(source.id);
    let mut total = 0;
    for (position, output) in source.outputs.iter().enumerate() {
        builder = builder.input(OutputRef::new(source.id, position as u32), &kp);
        total += output.amount.raw();
    }
    builder.output(address(200), Amount::new(total)).build().unwrap()
}

pub struct Ledger {
    pub params: ConsensusParams,
    pub genesis: Transaction,
    pub store: Arc<NullStore>,
    pub wallet: Arc<NullWallet>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::with_params(ConsensusParams::default())
    }

    pub fn with_wallet(mut self, wallet: NullWallet) -> Self {
        self.wallet = Arc::new(wallet);
        self
    }

    pub fn with_params(mut params: ConsensusParams) -> Self {
        let genesis = genesis(4);
        params.genesis_transaction_id = genesis.id;
        let store = Arc::new(NullStore::new());
        store.insert_stable(genesis.clone());
        Self {
            params,
            genesis,
            store,
            wallet: Arc::new(NullWallet::new()),
        }
    }
}

pub struct Harness {
    pub ledger: Ledger,
    pub network: Arc<NullNetwork>,
    pub coordinator: Arc<Coordinator>,
    pub mutex: MutexManager,
    pub events: Arc<Mutex<Vec<ConsensusEvent>>>,
}

impl Harness {
    pub fn new(ledger: Ledger, network: NullNetwork) -> Self {
        let network = Arc::new(network);
        let mutex = MutexManager::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        let sink = Arc::clone(&events);
        bus.subscribe(Box::new(move |event| sink.lock().unwrap().push(event.clone())));

        let coordinator = Coordinator::new(
            ledger.params.clone(),
            ledger.store.clone(),
            network.clone(),
            ledger.wallet.clone(),
            mutex.clone(),
            Arc::new(bus),
        );
        Self {
            ledger,
            network,
            coordinator,
            mutex,
            events,
        }
    }

    pub fn events(&self) -> Vec<ConsensusEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn scheduler(&self) -> ValidationScheduler {
        ValidationScheduler::new(
            self.ledger.params.clone(),
            Arc::clone(&self.coordinator),
            self.ledger.store.clone(),
            self.ledger.wallet.clone(),
            self.mutex.clone(),
        )
    }
}
