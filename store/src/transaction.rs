//! Transaction repository contract.

use crate::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tangle_transactions::{OutputRef, OutputState, Transaction, TransactionInput};
use tangle_types::{Address, Amount, Timestamp, TransactionId};

/// A stored output together with its ledger flags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub output: OutputRef,
    pub address: Address,
    pub amount: Amount,
    pub state: OutputState,
}

/// Filter for the scheduler's unstable-transaction scan.
#[derive(Clone, Debug, Default)]
pub struct UnstableQuery {
    /// Only transactions dated strictly before this.
    pub created_before: Timestamp,
    /// Ids never returned (already rejected or mid-consensus).
    pub exclude: Vec<TransactionId>,
    /// When set, only transactions with an output owned by one of these.
    pub funding_addresses: Option<Vec<Address>>,
    pub limit: usize,
}

impl UnstableQuery {
    /// Whether `tx` passes every filter except `limit`.
    pub fn matches(&self, tx: &Transaction) -> bool {
        if tx.is_stable || tx.status != tangle_transactions::TransactionStatus::Pending {
            return false;
        }
        if tx.normalized_date() >= self.created_before || self.exclude.contains(&tx.id) {
            return false;
        }
        match &self.funding_addresses {
            Some(addresses) => tx.outputs.iter().any(|o| addresses.contains(&o.address)),
            None => true,
        }
    }
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Fetch a transaction with its ledger state.
    async fn get_transaction_object(
        &self,
        id: &TransactionId,
    ) -> Result<Option<Transaction>, StoreError>;

    async fn get_output(&self, output: &OutputRef) -> Result<Option<OutputRecord>, StoreError>;

    /// Every other transaction that spends the same output as `input`
    /// (excluding `spender` itself).
    async fn get_input_double_spend(
        &self,
        input: &TransactionInput,
        spender: &TransactionId,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Mark stable: status, inputs' source outputs spent, own outputs stable.
    async fn update_transaction_as_stable(&self, id: &TransactionId) -> Result<(), StoreError>;

    /// Flag the transaction and its outputs as double spent, status invalid.
    async fn update_transaction_as_double_spend(
        &self,
        id: &TransactionId,
    ) -> Result<(), StoreError>;

    async fn invalidate_transaction(&self, id: &TransactionId) -> Result<(), StoreError>;

    /// Mark timed out and drop data of children that depend on it.
    async fn timeout_transaction(&self, id: &TransactionId) -> Result<(), StoreError>;

    /// Return a transaction to `pending`, clearing invalid/double-spend flags,
    /// so it is validated again.
    async fn reset_transaction_validation(&self, id: &TransactionId) -> Result<(), StoreError>;

    async fn delete_transaction(&self, id: &TransactionId) -> Result<(), StoreError>;

    /// Pending transactions matching `query`, oldest first.
    async fn find_unstable_transactions(
        &self,
        query: &UnstableQuery,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Pending transactions that fund one of `addresses`.
    async fn find_wallet_funding_transactions(
        &self,
        addresses: &[Address],
        query: &UnstableQuery,
    ) -> Result<Vec<Transaction>, StoreError> {
        let query = UnstableQuery {
            funding_addresses: Some(addresses.to_vec()),
            ..query.clone()
        };
        self.find_unstable_transactions(&query).await
    }
}
