//! Nullable store: thread-safe in-memory transaction repository for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tangle_store::{OutputRecord, StoreError, TransactionRepository, UnstableQuery};
use tangle_transactions::{OutputRef, Transaction, TransactionInput, TransactionStatus};
use tangle_types::TransactionId;

/// An in-memory transaction repository implementing the full ledger
/// contract. Thread-safe for use with tokio's multi-threaded runtime.
#[derive(Debug, Default)]
pub struct NullStore {
    transactions: Mutex<HashMap<TransactionId, Transaction>>,
    deleted: Mutex<Vec<TransactionId>>,
    fail_writes: Mutex<bool>,
}

impl NullStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `tx` as-is.
    pub fn insert(&self, tx: Transaction) {
        self.transactions.lock().unwrap().insert(tx.id, tx);
    }

    /// Store `tx` already stable, outputs included.
    pub fn insert_stable(&self, mut tx: Transaction) {
        tx.status = TransactionStatus::Stable;
        tx.is_stable = true;
        for output in &mut tx.outputs {
            output.state.is_stable = true;
        }
        self.insert(tx);
    }

    pub fn get(&self, id: &TransactionId) -> Option<Transaction> {
        self.transactions.lock().unwrap().get(id).cloned()
    }

    pub fn status(&self, id: &TransactionId) -> Option<TransactionStatus> {
        self.get(id).map(|tx| tx.status)
    }

    pub fn output(&self, output: &OutputRef) -> Option<OutputRecord> {
        let transactions = self.transactions.lock().unwrap();
        let tx = transactions.get(&output.transaction_id)?;
        let out = tx.outputs.get(output.position as usize)?;
        Some(OutputRecord {
            output: *output,
            address: out.address.clone(),
            amount: out.amount,
            state: out.state,
        })
    }

    pub fn deleted(&self) -> Vec<TransactionId> {
        self.deleted.lock().unwrap().clone()
    }

    /// Make every ledger update fail with a backend error.
    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap() = fail;
    }

    fn update(
        &self,
        id: &TransactionId,
        f: impl FnOnce(&mut HashMap<TransactionId, Transaction>, TransactionId),
    ) -> Result<(), StoreError> {
        if *self.fail_writes.lock().unwrap() {
            return Err(StoreError::Backend("writes disabled".into()));
        }
        let mut transactions = self.transactions.lock().unwrap();
        if !transactions.contains_key(id) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        f(&mut transactions, *id);
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for NullStore {
    async fn get_transaction_object(
        &self,
        id: &TransactionId,
    ) -> Result<Option<Transaction>, StoreError> {
        Ok(self.get(id))
    }

    async fn get_output(&self, output: &OutputRef) -> Result<Option<OutputRecord>, StoreError> {
        Ok(self.output(output))
    }

    async fn get_input_double_spend(
        &self,
        input: &TransactionInput,
        spender: &TransactionId,
    ) -> Result<Vec<Transaction>, StoreError> {
        let mut competitors: Vec<Transaction> = self
            .transactions
            .lock()
            .unwrap()
            .values()
            .filter(|tx| tx.id != *spender)
            .filter(|tx| tx.inputs.iter().any(|i| i.output == input.output))
            .cloned()
            .collect();
        competitors.sort_by_key(|tx| tx.id);
        Ok(competitors)
    }

    async fn update_transaction_as_stable(&self, id: &TransactionId) -> Result<(), StoreError> {
        self.update(id, |txs, id| {
            let spent: Vec<OutputRef> = match txs.get_mut(&id) {
                Some(tx) => {
                    tx.status = TransactionStatus::Stable;
                    tx.is_stable = true;
                    for output in &mut tx.outputs {
                        output.state.is_stable = true;
                    }
                    tx.inputs.iter().map(|i| i.output).collect()
                }
                None => return,
            };
            for output in spent {
                if let Some(source) = txs.get_mut(&output.transaction_id) {
                    if let Some(out) = source.outputs.get_mut(output.position as usize) {
                        out.state.is_spent = true;
                    }
                }
            }
        })
    }

    async fn update_transaction_as_double_spend(
        &self,
        id: &TransactionId,
    ) -> Result<(), StoreError> {
        self.update(id, |txs, id| {
            if let Some(tx) = txs.get_mut(&id) {
                tx.status = TransactionStatus::Invalid;
                tx.is_double_spend = true;
                for output in &mut tx.outputs {
                    output.state.is_double_spend = true;
                }
            }
        })
    }

    async fn invalidate_transaction(&self, id: &TransactionId) -> Result<(), StoreError> {
        self.update(id, |txs, id| {
            if let Some(tx) = txs.get_mut(&id) {
                tx.status = TransactionStatus::Invalid;
            }
        })
    }

    async fn timeout_transaction(&self, id: &TransactionId) -> Result<(), StoreError> {
        self.update(id, |txs, id| {
            if let Some(tx) = txs.get_mut(&id) {
                tx.status = TransactionStatus::Timeout;
                tx.is_timeout = true;
            }
            txs.retain(|_, child| {
                child.is_stable || !child.inputs.iter().any(|i| i.output.transaction_id == id)
            });
        })
    }

    async fn reset_transaction_validation(&self, id: &TransactionId) -> Result<(), StoreError> {
        self.update(id, |txs, id| {
            if let Some(tx) = txs.get_mut(&id) {
                tx.status = TransactionStatus::Pending;
                tx.is_double_spend = false;
                tx.is_timeout = false;
                for output in &mut tx.outputs {
                    output.state.is_double_spend = false;
                }
            }
        })
    }

    async fn delete_transaction(&self, id: &TransactionId) -> Result<(), StoreError> {
        self.transactions.lock().unwrap().remove(id);
        self.deleted.lock().unwrap().push(*id);
        Ok(())
    }

    async fn find_unstable_transactions(
        &self,
        query: &UnstableQuery,
    ) -> Result<Vec<Transaction>, StoreError> {
        let mut found: Vec<Transaction> = self
            .transactions
            .lock()
            .unwrap()
            .values()
            .filter(|tx| query.matches(tx))
            .cloned()
            .collect();
        found.sort_by_key(|tx| (tx.normalized_date(), tx.id));
        found.truncate(query.limit);
        Ok(found)
    }
}
