//! Tangle consensus node.
//!
//! Wires the consensus engine (`tangle-consensus`) to a transaction
//! repository, a peer transport and the wallet, and runs it:
//! - Routes inbound validation requests and votes
//! - Schedules pending transactions into consensus
//! - Re-samples idle rounds and gives up on overdue ones
//! - Purges stale leases and watches the mutex queue for deadlocks
//! - Exports Prometheus metrics
//!
//! Configuration comes from TOML ([`NodeConfig`]), logs go through
//! `tracing` ([`init_logging`]).

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod shutdown;

pub use config::NodeConfig;
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use node::ConsensusNode;
pub use shutdown::ShutdownController;
