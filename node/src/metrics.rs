//! Prometheus metrics for the tangle node.
//!
//! Counters are driven by [`ConsensusEvent`]s through
//! [`NodeMetrics::observe`]; gauges are refreshed periodically by the node.
//! The [`NodeMetrics`] struct owns a dedicated [`Registry`] that an exporter
//! can encode with [`NodeMetrics::encode`].

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge,
    Opts, Registry, TextEncoder,
};
use tangle_consensus::{ConsensusEvent, RoundOutcome};

/// Central collection of all node-level Prometheus metrics.
pub struct NodeMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Transactions that entered peer voting.
    pub rounds_started: IntCounter,
    /// Votes counted towards a round.
    pub votes_received: IntCounter,
    /// Votes dropped: no round, unsampled peer or a second vote.
    pub votes_ignored: IntCounter,
    pub outcomes_stable: IntCounter,
    pub outcomes_invalid: IntCounter,
    pub outcomes_double_spend: IntCounter,
    pub outcomes_timeout: IntCounter,
    /// Rounds exhausted without a verdict, queued for retry.
    pub outcomes_rejected: IntCounter,
    /// Transactions settled by local validation alone.
    pub local_rejections: IntCounter,
    /// Validation requests that failed at the transport.
    pub peer_request_failures: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Transactions with an open voting round.
    pub active_rounds: IntGauge,
    /// Transactions between dispatch and outcome.
    pub active_transactions: IntGauge,
    /// Validation leases held by remote peers.
    pub active_leases: IntGauge,
    /// Jobs waiting in the mutex queue.
    pub mutex_queue_len: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Time from the first round to the outcome, in milliseconds.
    pub consensus_duration_ms: Histogram,
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    register_int_counter_with_registry!(Opts::new(name, help), registry)
        .unwrap_or_else(|e| panic!("failed to register {name} counter: {e}"))
}

fn gauge(registry: &Registry, name: &str, help: &str) -> IntGauge {
    register_int_gauge_with_registry!(Opts::new(name, help), registry)
        .unwrap_or_else(|e| panic!("failed to register {name} gauge: {e}"))
}

impl NodeMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Self {
        let registry = Registry::new();

        let rounds_started = counter(
            &registry,
            "tangle_consensus_rounds_started_total",
            "Transactions that entered peer voting",
        );
        let votes_received = counter(
            &registry,
            "tangle_consensus_votes_received_total",
            "Peer votes counted towards a round",
        );
        let votes_ignored = counter(
            &registry,
            "tangle_consensus_votes_ignored_total",
            "Peer votes ignored",
        );
        let outcomes_stable = counter(
            &registry,
            "tangle_consensus_stable_total",
            "Transactions voted stable",
        );
        let outcomes_invalid = counter(
            &registry,
            "tangle_consensus_invalid_total",
            "Transactions voted invalid",
        );
        let outcomes_double_spend = counter(
            &registry,
            "tangle_consensus_double_spend_total",
            "Transactions voted double-spend",
        );
        let outcomes_timeout = counter(
            &registry,
            "tangle_consensus_timeout_total",
            "Transactions timed out as not found",
        );
        let outcomes_rejected = counter(
            &registry,
            "tangle_consensus_rejected_total",
            "Transactions rejected for a later retry",
        );
        let local_rejections = counter(
            &registry,
            "tangle_consensus_local_rejections_total",
            "Transactions settled by local validation",
        );
        let peer_request_failures = counter(
            &registry,
            "tangle_consensus_peer_request_failures_total",
            "Validation requests that failed at the transport",
        );

        let active_rounds = gauge(
            &registry,
            "tangle_consensus_active_rounds",
            "Transactions with an open voting round",
        );
        let active_transactions = gauge(
            &registry,
            "tangle_consensus_active_transactions",
            "Transactions between dispatch and outcome",
        );
        let active_leases = gauge(
            &registry,
            "tangle_validation_active_leases",
            "Validation leases held by remote peers",
        );
        let mutex_queue_len = gauge(
            &registry,
            "tangle_mutex_queue_len",
            "Jobs waiting in the mutex queue",
        );

        // Exponential buckets covering 10 ms → ~5.5 min.
        let consensus_duration_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "tangle_consensus_duration_ms",
                "Consensus duration in milliseconds"
            )
            .buckets(
                prometheus::exponential_buckets(10.0, 2.0, 16)
                    .expect("bucket parameters are valid")
            ),
            registry
        )
        .expect("failed to register consensus_duration_ms histogram");

        Self {
            registry,
            rounds_started,
            votes_received,
            votes_ignored,
            outcomes_stable,
            outcomes_invalid,
            outcomes_double_spend,
            outcomes_timeout,
            outcomes_rejected,
            local_rejections,
            peer_request_failures,
            active_rounds,
            active_transactions,
            active_leases,
            mutex_queue_len,
            consensus_duration_ms,
        }
    }

    /// Update counters from a consensus event.
    pub fn observe(&self, event: &ConsensusEvent) {
        match event {
            ConsensusEvent::RoundStarted { .. } => self.rounds_started.inc(),
            ConsensusEvent::VoteReceived { .. } => self.votes_received.inc(),
            ConsensusEvent::VoteIgnored { .. } => self.votes_ignored.inc(),
            ConsensusEvent::RoundFinished {
                outcome, elapsed, ..
            } => {
                match outcome {
                    RoundOutcome::Stable => self.outcomes_stable.inc(),
                    RoundOutcome::Invalid => self.outcomes_invalid.inc(),
                    RoundOutcome::DoubleSpend => self.outcomes_double_spend.inc(),
                    RoundOutcome::Timeout => self.outcomes_timeout.inc(),
                    RoundOutcome::RejectedRetry => self.outcomes_rejected.inc(),
                }
                self.consensus_duration_ms
                    .observe(elapsed.as_secs_f64() * 1_000.0);
            }
            ConsensusEvent::LocalRejection { .. } => self.local_rejections.inc(),
            ConsensusEvent::PeerRequestFailed { .. } => self.peer_request_failures.inc(),
        }
    }

    /// Encode every metric in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}
