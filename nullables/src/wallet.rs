//! Nullable wallet: records what consensus asks of it.

use async_trait::async_trait;
use std::sync::Mutex;
use tangle_consensus::WalletHooks;
use tangle_types::{Address, NodeId, TransactionId};

#[derive(Debug, Default)]
pub struct NullWallet {
    addresses: Mutex<Vec<Address>>,
    requested: Mutex<Vec<(TransactionId, Option<NodeId>)>>,
    updates: Mutex<Vec<Vec<Address>>>,
}

impl NullWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_addresses(addresses: Vec<Address>) -> Self {
        Self {
            addresses: Mutex::new(addresses),
            ..Self::default()
        }
    }

    /// Transactions requested from the network, with the preferred peer.
    pub fn requested(&self) -> Vec<(TransactionId, Option<NodeId>)> {
        self.requested.lock().unwrap().clone()
    }

    /// Address sets reported through `check_if_wallet_update`.
    pub fn updates(&self) -> Vec<Vec<Address>> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl WalletHooks for NullWallet {
    async fn request_transaction_from_network(
        &self,
        transaction_id: &TransactionId,
        peer: Option<&NodeId>,
    ) {
        self.requested
            .lock()
            .unwrap()
            .push((*transaction_id, peer.cloned()));
    }

    async fn check_if_wallet_update(&self, addresses: &[Address]) {
        self.updates.lock().unwrap().push(addresses.to_vec());
    }

    async fn wallet_addresses(&self) -> Vec<Address> {
        self.addresses.lock().unwrap().clone()
    }
}
