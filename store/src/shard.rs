//! Shard fan-out.
//!
//! Ledger data is partitioned into shards. Lookups stop at the first shard
//! that knows the answer ([`Shards::first_shards`]); scans run against every
//! shard and aggregate ([`Shards::apply_shards`]). Updates go to every shard
//! and succeed when at least one shard holds the transaction.

use crate::transaction::{OutputRecord, TransactionRepository, UnstableQuery};
use crate::StoreError;
use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tangle_transactions::{OutputRef, Transaction, TransactionInput};
use tangle_types::TransactionId;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShardId(String);

impl ShardId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type ShardRepository = Arc<dyn TransactionRepository>;

#[derive(Clone, Default)]
pub struct Shards {
    shards: Vec<(ShardId, ShardRepository)>,
}

impl Shards {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shard(mut self, id: ShardId, repository: ShardRepository) -> Self {
        self.shards.push((id, repository));
        self
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Run `f` against every shard concurrently and collect the results in
    /// shard order. The first error wins.
    pub async fn apply_shards<T, F, Fut>(&self, f: F) -> Result<Vec<T>, StoreError>
    where
        F: Fn(ShardRepository) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        join_all(self.shards.iter().map(|(_, repo)| f(Arc::clone(repo))))
            .await
            .into_iter()
            .collect()
    }

    /// Run `f` against shards in order until one yields `Some`.
    pub async fn first_shards<T, F, Fut>(&self, f: F) -> Result<Option<T>, StoreError>
    where
        F: Fn(ShardRepository) -> Fut,
        Fut: Future<Output = Result<Option<T>, StoreError>>,
    {
        for (_, repo) in &self.shards {
            if let Some(found) = f(Arc::clone(repo)).await? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }
}

impl Shards {
    /// Apply an update to every shard. Shards that do not hold the
    /// transaction answer `NotFound` and are skipped; the update fails when no
    /// shard holds it or when any shard fails otherwise.
    async fn apply_update<F, Fut>(&self, id: TransactionId, f: F) -> Result<(), StoreError>
    where
        F: Fn(ShardRepository) -> Fut,
        Fut: Future<Output = Result<(), StoreError>>,
    {
        let results = join_all(self.shards.iter().map(|(_, repo)| f(Arc::clone(repo)))).await;
        let mut applied = false;
        for result in results {
            match result {
                Ok(()) => applied = true,
                Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if applied {
            Ok(())
        } else {
            Err(StoreError::NotFound(id.to_string()))
        }
    }
}

fn dedup_by_id(transactions: impl IntoIterator<Item = Transaction>) -> Vec<Transaction> {
    let mut seen = HashSet::new();
    transactions
        .into_iter()
        .filter(|tx| seen.insert(tx.id))
        .collect()
}

#[async_trait]
impl TransactionRepository for Shards {
    async fn get_transaction_object(
        &self,
        id: &TransactionId,
    ) -> Result<Option<Transaction>, StoreError> {
        let id = *id;
        self.first_shards(move |s| async move { s.get_transaction_object(&id).await })
            .await
    }

    async fn get_output(&self, output: &OutputRef) -> Result<Option<OutputRecord>, StoreError> {
        let output = *output;
        self.first_shards(move |s| async move { s.get_output(&output).await })
            .await
    }

    async fn get_input_double_spend(
        &self,
        input: &TransactionInput,
        spender: &TransactionId,
    ) -> Result<Vec<Transaction>, StoreError> {
        let spender = *spender;
        let per_shard = self
            .apply_shards(|s| {
                let input = input.clone();
                async move { s.get_input_double_spend(&input, &spender).await }
            })
            .await?;
        Ok(dedup_by_id(per_shard.into_iter().flatten()))
    }

    async fn update_transaction_as_stable(&self, id: &TransactionId) -> Result<(), StoreError> {
        let id = *id;
        self.apply_update(id, move |s| async move { s.update_transaction_as_stable(&id).await })
            .await
    }

    async fn update_transaction_as_double_spend(
        &self,
        id: &TransactionId,
    ) -> Result<(), StoreError> {
        let id = *id;
        self.apply_update(id, move |s| async move {
            s.update_transaction_as_double_spend(&id).await
        })
        .await
    }

    async fn invalidate_transaction(&self, id: &TransactionId) -> Result<(), StoreError> {
        let id = *id;
        self.apply_update(id, move |s| async move { s.invalidate_transaction(&id).await })
            .await
    }

    async fn timeout_transaction(&self, id: &TransactionId) -> Result<(), StoreError> {
        let id = *id;
        self.apply_update(id, move |s| async move { s.timeout_transaction(&id).await })
            .await
    }

    async fn reset_transaction_validation(&self, id: &TransactionId) -> Result<(), StoreError> {
        let id = *id;
        self.apply_update(id, move |s| async move { s.reset_transaction_validation(&id).await })
            .await
    }

    async fn delete_transaction(&self, id: &TransactionId) -> Result<(), StoreError> {
        let id = *id;
        self.apply_update(id, move |s| async move { s.delete_transaction(&id).await })
            .await
    }

    async fn find_unstable_transactions(
        &self,
        query: &UnstableQuery,
    ) -> Result<Vec<Transaction>, StoreError> {
        let per_shard = self
            .apply_shards(|s| {
                let query = query.clone();
                async move { s.find_unstable_transactions(&query).await }
            })
            .await?;
        let mut merged = dedup_by_id(per_shard.into_iter().flatten());
        merged.sort_by_key(|tx| (tx.normalized_date(), tx.id));
        merged.truncate(query.limit);
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tangle_transactions::{TransactionStatus, CURRENT_VERSION};
    use tangle_types::Timestamp;

    /// Minimal single-map shard for exercising the fan-out.
    #[derive(Default)]
    struct MapShard {
        txs: Mutex<Vec<Transaction>>,
        stable_calls: Mutex<u32>,
    }

    fn tx(byte: u8, date: u64) -> Transaction {
        Transaction {
            id: TransactionId::new([byte; 32]),
            version: CURRENT_VERSION,
            transaction_date: Timestamp::new(date),
            parents: vec![],
            inputs: vec![],
            outputs: vec![],
            status: TransactionStatus::Pending,
            is_stable: false,
            is_timeout: false,
            is_double_spend: false,
        }
    }

    #[async_trait]
    impl TransactionRepository for MapShard {
        async fn get_transaction_object(
            &self,
            id: &TransactionId,
        ) -> Result<Option<Transaction>, StoreError> {
            Ok(self.txs.lock().unwrap().iter().find(|t| t.id == *id).cloned())
        }
        async fn get_output(&self, _: &OutputRef) -> Result<Option<OutputRecord>, StoreError> {
            Ok(None)
        }
        async fn get_input_double_spend(
            &self,
            _: &TransactionInput,
            _: &TransactionId,
        ) -> Result<Vec<Transaction>, StoreError> {
            Ok(vec![])
        }
        async fn update_transaction_as_stable(&self, _: &TransactionId) -> Result<(), StoreError> {
            *self.stable_calls.lock().unwrap() += 1;
            Ok(())
        }
        async fn update_transaction_as_double_spend(
            &self,
            _: &TransactionId,
        ) -> Result<(), StoreError> {
            Ok(())
        }
        async fn invalidate_transaction(&self, _: &TransactionId) -> Result<(), StoreError> {
            Err(StoreError::Backend("read-only shard".into()))
        }
        async fn timeout_transaction(&self, _: &TransactionId) -> Result<(), StoreError> {
            Ok(())
        }
        async fn reset_transaction_validation(&self, _: &TransactionId) -> Result<(), StoreError> {
            Ok(())
        }
        async fn delete_transaction(&self, _: &TransactionId) -> Result<(), StoreError> {
            Ok(())
        }
        async fn find_unstable_transactions(
            &self,
            query: &UnstableQuery,
        ) -> Result<Vec<Transaction>, StoreError> {
            Ok(self
                .txs
                .lock()
                .unwrap()
                .iter()
                .filter(|t| query.matches(t))
                .cloned()
                .collect())
        }
    }

    /// Shard that holds nothing.
    struct MissingShard;

    fn missing(id: &TransactionId) -> Result<(), StoreError> {
        Err(StoreError::NotFound(id.to_string()))
    }

    #[async_trait]
    impl TransactionRepository for MissingShard {
        async fn get_transaction_object(
            &self,
            _: &TransactionId,
        ) -> Result<Option<Transaction>, StoreError> {
            Ok(None)
        }
        async fn get_output(&self, _: &OutputRef) -> Result<Option<OutputRecord>, StoreError> {
            Ok(None)
        }
        async fn get_input_double_spend(
            &self,
            _: &TransactionInput,
            _: &TransactionId,
        ) -> Result<Vec<Transaction>, StoreError> {
            Ok(vec![])
        }
        async fn update_transaction_as_stable(&self, id: &TransactionId) -> Result<(), StoreError> {
            missing(id)
        }
        async fn update_transaction_as_double_spend(
            &self,
            id: &TransactionId,
        ) -> Result<(), StoreError> {
            missing(id)
        }
        async fn invalidate_transaction(&self, id: &TransactionId) -> Result<(), StoreError> {
            missing(id)
        }
        async fn timeout_transaction(&self, id: &TransactionId) -> Result<(), StoreError> {
            missing(id)
        }
        async fn reset_transaction_validation(&self, id: &TransactionId) -> Result<(), StoreError> {
            missing(id)
        }
        async fn delete_transaction(&self, id: &TransactionId) -> Result<(), StoreError> {
            missing(id)
        }
        async fn find_unstable_transactions(
            &self,
            _: &UnstableQuery,
        ) -> Result<Vec<Transaction>, StoreError> {
            Ok(vec![])
        }
    }

    fn two_shards() -> (Shards, Arc<MapShard>, Arc<MapShard>) {
        let a = Arc::new(MapShard::default());
        let b = Arc::new(MapShard::default());
        a.txs.lock().unwrap().extend([tx(1, 300), tx(2, 100)]);
        b.txs.lock().unwrap().extend([tx(3, 200), tx(2, 100)]);
        let shards = Shards::new()
            .with_shard(ShardId::new("root"), a.clone())
            .with_shard(ShardId::new("wallet"), b.clone());
        (shards, a, b)
    }

    #[tokio::test]
    async fn lookup_falls_through_to_later_shard() {
        let (shards, _, _) = two_shards();
        let found = shards
            .get_transaction_object(&TransactionId::new([3; 32]))
            .await
            .unwrap();
        assert_eq!(found.map(|t| t.id), Some(TransactionId::new([3; 32])));
        assert!(shards
            .get_transaction_object(&TransactionId::new([9; 32]))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn updates_reach_every_shard() {
        let (shards, a, b) = two_shards();
        shards
            .update_transaction_as_stable(&TransactionId::new([1; 32]))
            .await
            .unwrap();
        assert_eq!(*a.stable_calls.lock().unwrap(), 1);
        assert_eq!(*b.stable_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn update_unknown_to_every_shard_is_not_found() {
        let shards = Shards::new()
            .with_shard(ShardId::new("root"), Arc::new(MissingShard))
            .with_shard(ShardId::new("wallet"), Arc::new(MissingShard));
        assert!(matches!(
            shards.timeout_transaction(&TransactionId::new([1; 32])).await,
            Err(StoreError::NotFound(_))
        ));
        let (mixed, _, _) = two_shards();
        let mixed = mixed.with_shard(ShardId::new("empty"), Arc::new(MissingShard));
        mixed
            .timeout_transaction(&TransactionId::new([1; 32]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn shard_error_surfaces() {
        let (shards, _, _) = two_shards();
        assert!(shards
            .invalidate_transaction(&TransactionId::new([1; 32]))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn unstable_scan_merges_sorted_and_limited() {
        let (shards, _, _) = two_shards();
        let query = UnstableQuery {
            created_before: Timestamp::new(1_000),
            exclude: vec![],
            funding_addresses: None,
            limit: 2,
        };
        let found = shards.find_unstable_transactions(&query).await.unwrap();
        let ids: Vec<_> = found.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![TransactionId::new([2; 32]), TransactionId::new([3; 32])]);
    }
}
