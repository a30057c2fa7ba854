//! Shared utilities for the tangle node.
//!
//! - [`mutex`]: the cooperative key-based lock manager that serialises
//!   conflicting ledger mutations.
//! - [`time`]: human-readable duration formatting for logs.

pub mod mutex;
pub mod time;

pub use mutex::{LockKey, LockOptions, LockOutcome, MutexError, MutexManager, Unlock};
pub use time::format_duration;
