//! Consensus parameters.
//!
//! Every node carries one [`ConsensusParams`]; the node configuration's
//! `[consensus]` table deserialises straight into it, with any missing field
//! falling back to the default below.

use crate::hash::TransactionId;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusParams {
    // ── Rounds ───────────────────────────────────────────────────────────
    /// Peers sampled per round (`CONSENSUS_ROUND_NODE_COUNT`).
    pub round_node_count: usize,

    /// Rounds of >= 2/3 `valid` needed for stability
    /// (`CONSENSUS_ROUND_VALIDATION_REQUIRED`).
    pub validation_required: u32,

    /// Rounds attempted before the transaction is provisionally rejected
    /// (`CONSENSUS_ROUND_VALIDATION_MAX`).
    pub validation_max: u32,

    /// Rounds of >= 2/3 double-spend (and, absent competing evidence,
    /// invalid) votes before the verdict is final
    /// (`CONSENSUS_ROUND_DOUBLE_SPEND_MAX`).
    pub double_spend_max: u32,

    /// Rounds of >= 2/3 not-found votes before the transaction times out
    /// (`CONSENSUS_ROUND_NOT_FOUND_MAX`).
    pub not_found_max: u32,

    /// Transactions allowed in consensus at once
    /// (`CONSENSUS_VALIDATION_PARALLEL_PROCESS_MAX`).
    pub parallel_process_max: usize,

    // ── Timeouts (seconds) ───────────────────────────────────────────────
    /// Idle time after which a round is re-sampled; also the lease lifetime
    /// (`CONSENSUS_VALIDATION_WAIT_TIME_MAX`).
    pub validation_wait_time_max_secs: u64,

    /// Deadline for a peer to accept or reject a validation request
    /// (`NETWORK_SHORT_TIME_WAIT_MAX`).
    pub network_short_wait_max_secs: u64,

    /// Wall-clock budget when validating on another node's behalf.
    pub proxy_time_limit_secs: u64,

    /// Transactions younger than this are left alone by the scheduler.
    pub transaction_grace_secs: u64,

    /// Cool-down applied to a peer that rejected a validation request.
    pub peer_discard_secs: u64,

    /// How long a provisionally rejected transaction stays excluded.
    pub rejected_retry_secs: u64,

    // ── Limits ───────────────────────────────────────────────────────────
    /// Maximum ancestor traversal depth.
    pub max_validation_depth: u32,

    /// Consecutive request timeouts before the peer is rotated out.
    pub peer_timeout_max: u32,

    /// Capacity of the provisionally-rejected registry.
    pub rejected_capacity: usize,

    /// Leases served to remote peers at once.
    pub validation_lease_max: usize,

    /// Genesis transaction; always valid, never voted on.
    pub genesis_transaction_id: TransactionId,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            round_node_count: 3,
            validation_required: 2,
            validation_max: 5,
            double_spend_max: 5,
            not_found_max: 5,
            parallel_process_max: 1,
            validation_wait_time_max_secs: 30,
            network_short_wait_max_secs: 10,
            proxy_time_limit_secs: 30,
            transaction_grace_secs: 30,
            peer_discard_secs: 5,
            rejected_retry_secs: 300,
            max_validation_depth: 10_000,
            peer_timeout_max: 15,
            rejected_capacity: 1_000,
            validation_lease_max: 16,
            genesis_transaction_id: TransactionId::ZERO,
        }
    }
}

impl ConsensusParams {
    /// Whether `count` out of `total` responses is a two-thirds supermajority.
    pub fn is_supermajority(count: usize, total: usize) -> bool {
        total > 0 && count * 3 >= total * 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let p = ConsensusParams::default();
        assert_eq!(p.round_node_count, 3);
        assert_eq!(p.validation_required, 2);
        assert_eq!(p.validation_max, 5);
        assert_eq!(p.double_spend_max, 5);
        assert_eq!(p.max_validation_depth, 10_000);
        assert_eq!(p.peer_timeout_max, 15);
    }

    #[test]
    fn supermajority_boundaries() {
        assert!(ConsensusParams::is_supermajority(2, 3));
        assert!(!ConsensusParams::is_supermajority(1, 3));
        assert!(ConsensusParams::is_supermajority(3, 3));
        assert!(!ConsensusParams::is_supermajority(2, 4));
        assert!(ConsensusParams::is_supermajority(3, 4));
        assert!(!ConsensusParams::is_supermajority(0, 0));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let p: ConsensusParams = serde_json::from_str(r#"{"round_node_count": 5}"#).unwrap();
        assert_eq!(p.round_node_count, 5);
        assert_eq!(p.validation_required, 2);
    }
}
