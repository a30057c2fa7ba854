//! The tangle consensus node.
//!
//! [`ConsensusNode`] owns one instance of every consensus component, routes
//! inbound peer messages to them and runs the periodic loops that keep
//! consensus moving: the scheduler, the round watchdog, lease purging, the
//! mutex deadlock watchdog and the metrics refresh.

use std::sync::Arc;
use std::time::Duration;

use tangle_consensus::{
    ConsensusEvent, Coordinator, CycleOutcome, EventBus, ValidationResponder, ValidationScheduler,
    WalletHooks,
};
use tangle_messages::PeerMessage;
use tangle_network::PeerTransport;
use tangle_store::TransactionRepository;
use tangle_types::{NodeId, Timestamp};
use tangle_utils::MutexManager;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::metrics::NodeMetrics;
use crate::shutdown::ShutdownController;

/// Timeout for waiting on background tasks during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A running consensus node.
pub struct ConsensusNode {
    pub config: NodeConfig,
    pub coordinator: Arc<Coordinator>,
    pub responder: Arc<ValidationResponder>,
    pub scheduler: Arc<ValidationScheduler>,
    pub mutex: MutexManager,
    pub metrics: Arc<NodeMetrics>,
    pub shutdown: Arc<ShutdownController>,
    /// Handles for spawned background tasks (joined during shutdown).
    task_handles: Vec<JoinHandle<()>>,
}

impl ConsensusNode {
    /// Wire a node over its collaborators. Nothing runs until [`start`](Self::start).
    pub fn new(
        config: NodeConfig,
        repository: Arc<dyn TransactionRepository>,
        transport: Arc<dyn PeerTransport>,
        wallet: Arc<dyn WalletHooks>,
    ) -> Self {
        Self::with_event_bus(config, repository, transport, wallet, EventBus::new())
    }

    /// Like [`new`](Self::new), keeping the listeners already on `events`.
    /// The metrics listener is added on top.
    pub fn with_event_bus(
        config: NodeConfig,
        repository: Arc<dyn TransactionRepository>,
        transport: Arc<dyn PeerTransport>,
        wallet: Arc<dyn WalletHooks>,
        mut events: EventBus,
    ) -> Self {
        let metrics = Arc::new(NodeMetrics::new());
        let sink = Arc::clone(&metrics);
        events.subscribe(Box::new(move |event: &ConsensusEvent| sink.observe(event)));

        let params = config.consensus.clone();
        let mutex = MutexManager::new();
        let coordinator = Coordinator::new(
            params.clone(),
            Arc::clone(&repository),
            Arc::clone(&transport),
            Arc::clone(&wallet),
            mutex.clone(),
            Arc::new(events),
        );
        let responder = ValidationResponder::new(&params, coordinator.validator(), transport);
        let scheduler = Arc::new(ValidationScheduler::new(
            params,
            Arc::clone(&coordinator),
            repository,
            wallet,
            mutex.clone(),
        ));

        Self {
            config,
            coordinator,
            responder,
            scheduler,
            mutex,
            metrics,
            shutdown: Arc::new(ShutdownController::new()),
            task_handles: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task_handles.is_empty()
    }

    /// Spawn the background loops.
    pub fn start(&mut self) -> Result<(), NodeError> {
        if self.is_running() {
            return Err(NodeError::AlreadyStarted);
        }
        if self.shutdown.is_shutdown() {
            return Err(NodeError::Stopped);
        }
        tracing::info!(
            round_node_count = self.config.consensus.round_node_count,
            parallel_process_max = self.config.consensus.parallel_process_max,
            "tangle node starting"
        );

        // ── Validation scheduler ─────────────────────────────────────────
        {
            let scheduler = Arc::clone(&self.scheduler);
            let mut shutdown_rx = self.shutdown.subscribe();
            let period = self.config.scheduler_interval();
            self.task_handles.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.recv() => {
                            tracing::debug!("validation scheduler shutting down");
                            break;
                        }
                        _ = interval.tick() => {
                            // A dispatch may leave room for another; keep going
                            // until the cycle comes back empty.
                            loop {
                                match scheduler.run_cycle(Timestamp::now()).await {
                                    Ok(CycleOutcome::Dispatched(id)) => {
                                        tracing::debug!(tx = %id, "transaction dispatched");
                                    }
                                    Ok(_) => break,
                                    Err(e) => {
                                        tracing::warn!(error = %e, "scheduling cycle failed");
                                        break;
                                    }
                                }
                            }
                        }
                    }
                }
            }));
        }

        // ── Round watchdog ───────────────────────────────────────────────
        {
            let coordinator = Arc::clone(&self.coordinator);
            let mut shutdown_rx = self.shutdown.subscribe();
            let period = self.config.round_watchdog_interval();
            self.task_handles.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.recv() => {
                            tracing::debug!("round watchdog shutting down");
                            break;
                        }
                        _ = interval.tick() => {
                            match coordinator.resample_idle_rounds().await {
                                Ok(0) => {}
                                Ok(n) => tracing::debug!(rounds = n, "idle rounds re-sampled"),
                                Err(e) => tracing::warn!(error = %e, "round watchdog failed"),
                            }
                            let purged = coordinator.purge_rejected(Timestamp::now());
                            if purged > 0 {
                                tracing::debug!(purged, "rejected transactions released for retry");
                            }
                        }
                    }
                }
            }));
        }

        // ── Lease purge ──────────────────────────────────────────────────
        {
            let responder = Arc::clone(&self.responder);
            let mut shutdown_rx = self.shutdown.subscribe();
            let period = self.config.lease_purge_interval();
            self.task_handles.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.recv() => {
                            tracing::debug!("lease purge shutting down");
                            break;
                        }
                        _ = interval.tick() => {
                            let purged = responder.purge_stale_leases();
                            if purged > 0 {
                                tracing::debug!(purged, "stale validation leases dropped");
                            }
                        }
                    }
                }
            }));
        }

        // ── Mutex deadlock watchdog ──────────────────────────────────────
        {
            let mutex = self.mutex.clone();
            let mut shutdown_rx = self.shutdown.subscribe();
            let period = self.config.deadlock_check_interval();
            self.task_handles.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.recv() => {
                            tracing::debug!("deadlock watchdog shutting down");
                            break;
                        }
                        _ = interval.tick() => {
                            if let Err(e) = mutex.check_for_deadlocks() {
                                tracing::error!(error = %e, "mutex queue stuck");
                            }
                            let expired = mutex.purge_expired();
                            if expired > 0 {
                                tracing::warn!(expired, "expired mutex jobs dropped");
                            }
                        }
                    }
                }
            }));
        }

        // ── Metrics refresh ──────────────────────────────────────────────
        if self.config.enable_metrics {
            let gauges = self.gauge_sources();
            let mut shutdown_rx = self.shutdown.subscribe();
            let period = self.config.metrics_interval();
            self.task_handles.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.recv() => {
                            tracing::debug!("metrics refresh shutting down");
                            break;
                        }
                        _ = interval.tick() => gauges.refresh().await,
                    }
                }
            }));
        }

        tracing::info!(tasks = self.task_handles.len(), "tangle node started");
        Ok(())
    }

    /// Signal every loop to stop and wait for them.
    ///
    /// Transactions already dispatched keep running to their outcome.
    pub async fn stop(&mut self) -> Result<(), NodeError> {
        tracing::info!("tangle node stopping");
        self.shutdown.shutdown();

        let handles: Vec<JoinHandle<()>> = self.task_handles.drain(..).collect();
        let wait_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, wait_all)
            .await
            .is_err()
        {
            tracing::warn!(
                "shutdown timeout ({:?}), some tasks may still be running",
                SHUTDOWN_TIMEOUT
            );
        }

        // Final metrics snapshot
        self.refresh_metrics().await;

        tracing::info!("tangle node stopped");
        Ok(())
    }

    /// Start, block until SIGINT or SIGTERM, then stop.
    pub async fn run_until_signal(&mut self) -> Result<(), NodeError> {
        self.start()?;
        let waited = self.shutdown.wait_for_signal().await;
        self.stop().await?;
        waited.map_err(NodeError::Io)
    }

    /// Update every gauge from the current engine state.
    pub async fn refresh_metrics(&self) {
        self.gauge_sources().refresh().await;
    }

    fn gauge_sources(&self) -> GaugeSources {
        GaugeSources {
            metrics: Arc::clone(&self.metrics),
            coordinator: Arc::clone(&self.coordinator),
            responder: Arc::clone(&self.responder),
            mutex: self.mutex.clone(),
        }
    }

    /// Decode an inbound frame from `peer`, act on it and return the encoded
    /// reply, if the message calls for one.
    pub async fn handle_peer_message(
        &self,
        peer: &NodeId,
        bytes: &[u8],
    ) -> Result<Option<Vec<u8>>, NodeError> {
        let message = PeerMessage::from_bytes(bytes)?;
        match self.handle_message(peer, message).await? {
            Some(reply) => Ok(Some(reply.to_bytes()?)),
            None => Ok(None),
        }
    }

    /// Act on a decoded message from `peer`.
    pub async fn handle_message(
        &self,
        peer: &NodeId,
        message: PeerMessage,
    ) -> Result<Option<PeerMessage>, NodeError> {
        let span = tracing::debug_span!("peer_message", peer = %peer, kind = message.kind());
        self.route(peer, message).instrument(span).await
    }

    async fn route(
        &self,
        peer: &NodeId,
        message: PeerMessage,
    ) -> Result<Option<PeerMessage>, NodeError> {
        match message {
            PeerMessage::ValidationRequest(request) => {
                let id = request.transaction_id;
                let reply = self.responder.handle_request(peer.clone(), id);
                Ok(Some(PeerMessage::reply(id, reply)))
            }
            PeerMessage::ValidationVote(vote) => {
                self.coordinator
                    .on_vote(vote.transaction_id, peer.clone(), vote.verdict)
                    .await?;
                Ok(None)
            }
            // Start/reject answers travel back on the request they answer;
            // pushing transactions to peers belongs to the sync layer.
            other => {
                tracing::debug!(tx = %other.transaction_id(), "message not handled by consensus");
                Ok(None)
            }
        }
    }
}

/// Everything the gauge refresh reads, detached from the node so a
/// background task can own it.
struct GaugeSources {
    metrics: Arc<NodeMetrics>,
    coordinator: Arc<Coordinator>,
    responder: Arc<ValidationResponder>,
    mutex: MutexManager,
}

impl GaugeSources {
    async fn refresh(&self) {
        let rounds = self.coordinator.round_count().await;
        self.metrics.active_rounds.set(rounds as i64);
        self.metrics
            .active_transactions
            .set(self.coordinator.active_count() as i64);
        self.metrics
            .active_leases
            .set(self.responder.lease_count() as i64);
        self.metrics.mutex_queue_len.set(self.mutex.queue_len() as i64);
    }
}
