//! Abstract storage contracts for the tangle ledger.
//!
//! The consensus engine depends only on [`TransactionRepository`]. A real
//! backend implements it once per shard; [`Shards`] fans calls out across all
//! shards and is itself a `TransactionRepository`.

pub mod error;
pub mod shard;
pub mod transaction;

pub use error::StoreError;
pub use shard::{ShardId, Shards};
pub use transaction::{OutputRecord, TransactionRepository, UnstableQuery};
