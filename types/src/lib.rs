//! Fundamental types for the tangle ledger node.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! transaction ids, addresses, amounts, peer ids, timestamps, keys and the
//! consensus parameters.

pub mod address;
pub mod amount;
pub mod error;
pub mod hash;
pub mod keys;
pub mod node_id;
pub mod params;
pub mod time;

pub use address::Address;
pub use amount::Amount;
pub use error::TypeError;
pub use hash::TransactionId;
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use node_id::NodeId;
pub use params::ConsensusParams;
pub use time::Timestamp;
