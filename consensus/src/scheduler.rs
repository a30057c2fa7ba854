//! Validation scheduler: picks the next pending transaction for consensus.
//!
//! One cycle selects at most one candidate under the
//! [`SCHEDULER_LOCK`] mutex key: transactions funding our wallet first, then
//! the oldest unstable transaction across shards. Candidates younger than the
//! grace period, mid-consensus, or recently rejected are skipped.

use crate::coordinator::Coordinator;
use crate::error::ConsensusError;
use crate::wallet::WalletHooks;
use std::sync::Arc;
use tangle_store::{TransactionRepository, UnstableQuery};
use tangle_transactions::Transaction;
use tangle_types::{ConsensusParams, Timestamp, TransactionId};
use tangle_utils::{LockOptions, MutexManager};

/// Mutex key held while a scheduling cycle selects its candidate.
pub const SCHEDULER_LOCK: &str = "wallet-transaction-consensus-validation";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A transaction was handed to the coordinator.
    Dispatched(TransactionId),
    /// Nothing eligible right now.
    Idle,
    /// The parallel-process ceiling is reached.
    Saturated,
    /// Another cycle holds the scheduler lock.
    Busy,
}

pub struct ValidationScheduler {
    params: ConsensusParams,
    coordinator: Arc<Coordinator>,
    repository: Arc<dyn TransactionRepository>,
    wallet: Arc<dyn WalletHooks>,
    mutex: MutexManager,
}

impl ValidationScheduler {
    pub fn new(
        params: ConsensusParams,
        coordinator: Arc<Coordinator>,
        repository: Arc<dyn TransactionRepository>,
        wallet: Arc<dyn WalletHooks>,
        mutex: MutexManager,
    ) -> Self {
        Self {
            params,
            coordinator,
            repository,
            wallet,
            mutex,
        }
    }

    /// Run one scheduling cycle at `now`.
    pub async fn run_cycle(&self, now: Timestamp) -> Result<CycleOutcome, ConsensusError> {
        if self.coordinator.active_count() >= self.params.parallel_process_max {
            return Ok(CycleOutcome::Saturated);
        }
        if self.mutex.is_any_of_keys_locked(SCHEDULER_LOCK) {
            return Ok(CycleOutcome::Busy);
        }

        let mut guard = self
            .mutex
            .acquire(SCHEDULER_LOCK, LockOptions::default())
            .await?;
        let selected = self.select_candidate(now).await;
        guard.unlock()?;

        let Some(mut tx) = selected? else {
            return Ok(CycleOutcome::Idle);
        };
        tx.normalize_date();
        let id = tx.id;
        if !self.coordinator.dispatch(tx) {
            tracing::trace!(tx = %id, "candidate already in consensus");
            return Ok(CycleOutcome::Idle);
        }
        tracing::debug!(tx = %id, "transaction scheduled for consensus");
        Ok(CycleOutcome::Dispatched(id))
    }

    async fn select_candidate(&self, now: Timestamp) -> Result<Option<Transaction>, ConsensusError> {
        let mut exclude = self.coordinator.rejected_ids(now);
        exclude.extend(self.coordinator.active_transactions());
        let query = UnstableQuery {
            created_before: now.saturating_sub_secs(self.params.transaction_grace_secs),
            exclude,
            funding_addresses: None,
            limit: 1,
        };

        let addresses = self.wallet.wallet_addresses().await;
        if !addresses.is_empty() {
            let funding = self
                .repository
                .find_wallet_funding_transactions(&addresses, &query)
                .await?;
            if let Some(tx) = funding.into_iter().next() {
                return Ok(Some(tx));
            }
        }

        Ok(self
            .repository
            .find_unstable_transactions(&query)
            .await?
            .into_iter()
            .next())
    }
}
