//! Nullable infrastructure for deterministic testing.
//!
//! Every collaborator of the consensus engine sits behind a trait
//! ([`TransactionRepository`](tangle_store::TransactionRepository),
//! [`PeerTransport`](tangle_network::PeerTransport),
//! [`WalletHooks`](tangle_consensus::WalletHooks)). This crate provides
//! test-friendly implementations that:
//! - Keep all state in memory and never touch the filesystem or network
//! - Can be scripted programmatically
//! - Record every call for assertions
//!
//! Usage: swap real implementations for nullables in tests.

pub mod clock;
pub mod network;
pub mod store;
pub mod wallet;

pub use clock::NullClock;
pub use network::{NullNetwork, PeerScript};
pub use store::NullStore;
pub use wallet::NullWallet;
