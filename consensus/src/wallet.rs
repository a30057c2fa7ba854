//! Wallet facade.

use async_trait::async_trait;
use tangle_types::{Address, NodeId, TransactionId};

/// What the consensus engine needs from the local wallet.
#[async_trait]
pub trait WalletHooks: Send + Sync {
    /// Ask the network for a transaction we could not find locally,
    /// preferring `peer` when one is known to have it.
    async fn request_transaction_from_network(
        &self,
        transaction_id: &TransactionId,
        peer: Option<&NodeId>,
    );

    /// A transaction touching `addresses` became stable.
    async fn check_if_wallet_update(&self, addresses: &[Address]);

    /// Addresses owned by the local wallet; their funding transactions are
    /// validated first.
    async fn wallet_addresses(&self) -> Vec<Address>;
}
