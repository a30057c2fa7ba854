//! Consensus round coordinator.
//!
//! Drives a locally validated transaction through peer voting: samples peers
//! into the open slots of its [`RoundBook`] entry, sends them validation
//! requests, feeds their votes back into the book and persists the terminal
//! outcome. Peer failures only degrade that peer: a rejection puts it on
//! cool-down, a closed connection disconnects it, repeated timeouts rotate
//! it. In every case its slot is vacated and re-sampled.

use crate::error::{ConsensusError, FailureCause, Rejection};
use crate::event::{ConsensusEvent, EventBus};
use crate::rejected::RejectedRegistry;
use crate::round::{RoundBook, RoundOutcome, TallyResult, VoteOutcome};
use crate::validator::{AncestorValidator, ValidationContext};
use crate::wallet::WalletHooks;
use futures_util::future::BoxFuture;
use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;
use tangle_messages::{ValidationReply, VoteVerdict};
use tangle_network::{NetworkError, PeerHealth, PeerTransport};
use tangle_store::TransactionRepository;
use tangle_transactions::{Transaction, TransactionStatus};
use tangle_types::{ConsensusParams, NodeId, Timestamp, TransactionId};
use tangle_utils::{LockOptions, MutexManager};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Mutex key serialising ledger state changes.
pub const TRANSACTION_LOCK: &str = "transaction";

/// How a call to [`Coordinator::process_transaction`] ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Stable already, or genesis. No peer was asked.
    Settled,
    /// Peers voted it to this outcome.
    Consensus(RoundOutcome),
    /// Local validation failed for good; stored as invalid.
    Invalidated(FailureCause),
    /// Local validation lacked data; re-sync requested, retried later.
    Deferred(FailureCause),
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Coordinator {
    params: ConsensusParams,
    rounds: Mutex<RoundBook>,
    health: StdMutex<PeerHealth>,
    in_flight: StdMutex<HashSet<TransactionId>>,
    rejected: StdMutex<RejectedRegistry>,
    repository: Arc<dyn TransactionRepository>,
    transport: Arc<dyn PeerTransport>,
    wallet: Arc<dyn WalletHooks>,
    validator: Arc<AncestorValidator>,
    mutex: MutexManager,
    events: Arc<EventBus>,
}

impl Coordinator {
    pub fn new(
        params: ConsensusParams,
        repository: Arc<dyn TransactionRepository>,
        transport: Arc<dyn PeerTransport>,
        wallet: Arc<dyn WalletHooks>,
        mutex: MutexManager,
        events: Arc<EventBus>,
    ) -> Arc<Self> {
        let validator = Arc::new(AncestorValidator::new(
            &params,
            Arc::clone(&repository),
            Arc::clone(&wallet),
        ));
        Arc::new(Self {
            rounds: Mutex::new(RoundBook::new(&params)),
            health: StdMutex::new(PeerHealth::new(
                params.peer_timeout_max,
                Duration::from_secs(params.peer_discard_secs),
            )),
            in_flight: StdMutex::new(HashSet::new()),
            rejected: StdMutex::new(RejectedRegistry::new(
                params.rejected_capacity,
                params.rejected_retry_secs,
            )),
            params,
            repository,
            transport,
            wallet,
            validator,
            mutex,
            events,
        })
    }

    pub fn validator(&self) -> Arc<AncestorValidator> {
        Arc::clone(&self.validator)
    }

    // ── In-flight bookkeeping ────────────────────────────────────────────

    fn reserve(&self, id: TransactionId) -> bool {
        lock(&self.in_flight).insert(id)
    }

    fn release(&self, id: &TransactionId) {
        lock(&self.in_flight).remove(id);
    }

    /// Transactions between dispatch and outcome.
    pub fn active_count(&self) -> usize {
        lock(&self.in_flight).len()
    }

    pub fn active_transactions(&self) -> Vec<TransactionId> {
        lock(&self.in_flight).iter().copied().collect()
    }

    /// Transactions with an open voting round.
    pub async fn round_count(&self) -> usize {
        self.rounds.lock().await.active_count()
    }

    pub fn rejected_ids(&self, now: Timestamp) -> Vec<TransactionId> {
        lock(&self.rejected).ids(now)
    }

    pub fn is_rejected(&self, id: &TransactionId, now: Timestamp) -> bool {
        lock(&self.rejected).contains(id, now)
    }

    pub fn purge_rejected(&self, now: Timestamp) -> usize {
        lock(&self.rejected).purge(now)
    }

    fn reject_for_retry(&self, id: TransactionId) {
        lock(&self.rejected).insert(id, Timestamp::now());
    }

    // ── Entry points ─────────────────────────────────────────────────────

    /// Run `tx` in a background task. `false` if it is already in flight.
    pub fn dispatch(self: &Arc<Self>, tx: Transaction) -> bool {
        let id = tx.id;
        if !self.reserve(id) {
            return false;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            match this.run(tx).await {
                Ok(outcome) => tracing::debug!(tx = %id, ?outcome, "transaction processed"),
                Err(e) => tracing::warn!(tx = %id, error = %e, "transaction processing failed"),
            }
            this.release(&id);
        });
        true
    }

    /// Validate `tx` locally and, when it holds up, put it to peer vote.
    pub async fn process_transaction(
        self: &Arc<Self>,
        tx: Transaction,
    ) -> Result<ProcessOutcome, ConsensusError> {
        let id = tx.id;
        if !self.reserve(id) {
            return Err(ConsensusError::AlreadyInConsensus(id));
        }
        let result = self.run(tx).await;
        self.release(&id);
        result
    }

    async fn run(self: &Arc<Self>, tx: Transaction) -> Result<ProcessOutcome, ConsensusError> {
        let id = tx.id;
        if id == self.params.genesis_transaction_id || tx.is_settled() {
            return Ok(ProcessOutcome::Settled);
        }

        let mut ctx = ValidationContext::local();
        match self.validator.validate(id, &mut ctx).await {
            Ok(()) => {}
            Err(ConsensusError::Rejected(r)) if r.cause == FailureCause::DoubleSpend => {
                tracing::debug!(tx = %id, "local double spend, asking peers to confirm");
            }
            Err(ConsensusError::Rejected(r)) => return self.settle_locally(id, r).await,
            Err(e) => return Err(e),
        }

        let outcome = self.run_rounds(id).await?;
        Ok(ProcessOutcome::Consensus(outcome))
    }

    async fn settle_locally(
        &self,
        id: TransactionId,
        rejection: Rejection,
    ) -> Result<ProcessOutcome, ConsensusError> {
        let cause = rejection.cause;
        self.events.emit(ConsensusEvent::LocalRejection {
            transaction_id: id,
            cause,
        });

        if cause.is_terminal() {
            tracing::info!(tx = %id, cause = %cause, at = %rejection.transaction_id, "transaction invalid");
            let mut guard = self.mutex.acquire(TRANSACTION_LOCK, LockOptions::default()).await?;
            let result = self.repository.invalidate_transaction(&id).await;
            guard.unlock()?;
            result?;
            return Ok(ProcessOutcome::Invalidated(cause));
        }

        tracing::debug!(tx = %id, cause = %cause, missing = %rejection.transaction_id, "deferring transaction");
        self.reject_for_retry(id);
        if cause.needs_resync() {
            if let Err(e) = self
                .transport
                .transaction_sync_request(&rejection.transaction_id, None)
                .await
            {
                tracing::warn!(tx = %rejection.transaction_id, error = %e, "sync request failed");
            }
        }
        Ok(ProcessOutcome::Deferred(cause))
    }

    async fn run_rounds(self: &Arc<Self>, id: TransactionId) -> Result<RoundOutcome, ConsensusError> {
        let rx = self
            .rounds
            .lock()
            .await
            .begin_round(id, Instant::now())
            .ok_or(ConsensusError::AlreadyInConsensus(id))?;
        self.events.emit(ConsensusEvent::RoundStarted { transaction_id: id });
        tracing::info!(tx = %id, "consensus started");

        self.fill_slots(id).await;
        rx.await.map_err(|_| ConsensusError::RoundAbandoned(id))
    }

    // ── Peer sampling ────────────────────────────────────────────────────

    async fn fill_slots(self: &Arc<Self>, id: TransactionId) {
        let peers = self.transport.registered_clients().await;
        let now = Instant::now();
        let mut rounds = self.rounds.lock().await;
        let open = rounds.open_slots(&id);
        if open == 0 {
            return;
        }
        let exclude = rounds.excluded_peers(&id);
        let picks = lock(&self.health).select_candidates(&peers, &exclude, open, now);
        if picks.is_empty() {
            tracing::debug!(tx = %id, open, "no eligible peers, waiting for watchdog");
            return;
        }
        for peer in picks {
            if rounds.assign_peer(&id, peer.clone(), now) {
                let task = tokio::spawn(Arc::clone(self).request_vote(id, peer));
                rounds.track_task(&id, task.abort_handle());
            }
        }
    }

    fn request_vote(self: Arc<Self>, id: TransactionId, peer: NodeId) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let wait = Duration::from_secs(self.params.network_short_wait_max_secs);
            let reply = tokio::time::timeout(
                wait,
                self.transport.transaction_validation_request(&peer, &id),
            )
            .await
            .unwrap_or_else(|_| Err(NetworkError::NodeTimeout(peer.clone())));

            // A rejecting peer is only cooling down; every other failure
            // keeps it out of this consensus.
            let (code, discard) = match reply {
                Ok(ValidationReply::Start) => {
                    lock(&self.health).record_response(&peer);
                    self.rounds.lock().await.mark_started(&id, &peer);
                    tracing::trace!(tx = %id, peer = %peer, "peer started validation");
                    return;
                }
                Ok(ValidationReply::Reject(reason)) => {
                    tracing::debug!(tx = %id, peer = %peer, %reason, "peer rejected validation request");
                    lock(&self.health).cool_down(&peer, Instant::now());
                    ("validation_reject", false)
                }
                Err(NetworkError::NodeConnectionClosed(_)) => {
                    tracing::debug!(tx = %id, peer = %peer, "peer connection closed");
                    lock(&self.health).forget(&peer);
                    self.transport.disconnect(&peer).await;
                    ("node_connection_closed", true)
                }
                Err(NetworkError::NodeTimeout(_)) => {
                    let rotate = lock(&self.health).record_timeout(&peer);
                    if rotate {
                        self.transport.rotate_peer(&peer).await;
                    }
                    ("node_timeout", true)
                }
                Err(e) => {
                    tracing::warn!(tx = %id, peer = %peer, error = %e, "validation request failed");
                    (e.code(), true)
                }
            };
            self.events.emit(ConsensusEvent::PeerRequestFailed {
                peer: peer.clone(),
                code,
            });

            let vacated = self.rounds.lock().await.vacate_slot(&id, &peer, discard);
            if vacated {
                self.fill_slots(id).await;
            }
        })
    }

    // ── Votes and outcomes ───────────────────────────────────────────────

    /// Feed a peer's vote into the transaction's round.
    pub async fn on_vote(
        self: &Arc<Self>,
        id: TransactionId,
        peer: NodeId,
        verdict: VoteVerdict,
    ) -> Result<(), ConsensusError> {
        let outcome = self
            .rounds
            .lock()
            .await
            .record_vote(&id, &peer, verdict, Instant::now());

        let tally = match outcome {
            VoteOutcome::Ignored => {
                tracing::trace!(tx = %id, peer = %peer, "vote ignored");
                self.events.emit(ConsensusEvent::VoteIgnored {
                    transaction_id: id,
                    peer,
                });
                return Ok(());
            }
            VoteOutcome::Recorded => None,
            VoteOutcome::Tallied(tally) => Some(tally),
        };
        lock(&self.health).record_response(&peer);
        self.events.emit(ConsensusEvent::VoteReceived {
            transaction_id: id,
            peer,
            verdict,
        });

        match tally {
            None => Ok(()),
            Some(TallyResult::Resample { discarded }) => {
                tracing::debug!(tx = %id, discarded = discarded.len(), "minority voters discarded");
                self.fill_slots(id).await;
                Ok(())
            }
            Some(TallyResult::NextRound { round }) => {
                tracing::debug!(tx = %id, round, "next consensus round");
                self.fill_slots(id).await;
                Ok(())
            }
            Some(TallyResult::Finished(outcome)) => self.finish(id, outcome).await,
        }
    }

    async fn finish(&self, id: TransactionId, outcome: RoundOutcome) -> Result<(), ConsensusError> {
        let Some(finished) = self
            .rounds
            .lock()
            .await
            .end_round(&id, outcome, Instant::now())
        else {
            return Ok(());
        };

        let persisted = self.persist_outcome(id, outcome).await;
        if let Err(e) = &persisted {
            tracing::error!(tx = %id, outcome = outcome.as_str(), error = %e, "failed to persist consensus outcome");
        }
        tracing::info!(tx = %id, outcome = outcome.as_str(), rounds = finished.rounds, "consensus finished");
        self.events.emit(ConsensusEvent::RoundFinished {
            transaction_id: id,
            outcome,
            rounds: finished.rounds,
            elapsed: finished.elapsed,
        });
        finished.resolve();
        persisted
    }

    async fn persist_outcome(&self, id: TransactionId, outcome: RoundOutcome) -> Result<(), ConsensusError> {
        if outcome == RoundOutcome::RejectedRetry {
            self.reject_for_retry(id);
            if let Err(e) = self.transport.transaction_sync_request(&id, None).await {
                tracing::warn!(tx = %id, error = %e, "sync request failed");
            }
            return Ok(());
        }

        let mut guard = self.mutex.acquire(TRANSACTION_LOCK, LockOptions::default()).await?;
        let result = self.apply_outcome(id, outcome).await;
        guard.unlock()?;
        result
    }

    async fn apply_outcome(&self, id: TransactionId, outcome: RoundOutcome) -> Result<(), ConsensusError> {
        match outcome {
            RoundOutcome::Stable => {
                self.repository.update_transaction_as_stable(&id).await?;
                if let Some(tx) = self.repository.get_transaction_object(&id).await? {
                    self.wallet.check_if_wallet_update(&tx.addresses()).await;
                }
            }
            RoundOutcome::DoubleSpend => {
                let tx = self.repository.get_transaction_object(&id).await?;
                self.repository.update_transaction_as_double_spend(&id).await?;
                if let Some(tx) = tx {
                    self.reset_invalid_competitors(&tx).await?;
                }
            }
            RoundOutcome::Timeout => self.repository.timeout_transaction(&id).await?,
            RoundOutcome::Invalid => self.repository.invalidate_transaction(&id).await?,
            RoundOutcome::RejectedRetry => {}
        }
        Ok(())
    }

    /// Competitors invalidated earlier may be the rightful spenders now that
    /// `tx` is out of the way; send them back through validation.
    async fn reset_invalid_competitors(&self, tx: &Transaction) -> Result<(), ConsensusError> {
        for input in &tx.inputs {
            for competitor in self.repository.get_input_double_spend(input, &tx.id).await? {
                if competitor.status == TransactionStatus::Invalid {
                    tracing::debug!(tx = %competitor.id, "resetting validation of double-spend competitor");
                    self.repository
                        .reset_transaction_validation(&competitor.id)
                        .await?;
                }
            }
        }
        Ok(())
    }

    // ── Watchdog ─────────────────────────────────────────────────────────

    /// Re-sample rounds idle for the validation wait time, and give up on
    /// rounds that ran far past any reasonable length. Returns the number of
    /// rounds re-sampled.
    pub async fn resample_idle_rounds(self: &Arc<Self>) -> Result<usize, ConsensusError> {
        let now = Instant::now();
        let idle = Duration::from_secs(self.params.validation_wait_time_max_secs);
        let max_age = idle * self.params.validation_max.saturating_mul(2);

        let (stale, overdue) = {
            let mut rounds = self.rounds.lock().await;
            (rounds.purge_stale(now, idle), rounds.overdue(now, max_age))
        };
        lock(&self.health).purge(now);

        for id in &overdue {
            tracing::warn!(tx = %id, "consensus overdue, rejecting for retry");
            self.finish(*id, RoundOutcome::RejectedRetry).await?;
        }
        let mut resampled = 0;
        for id in stale.into_iter().filter(|id| !overdue.contains(id)) {
            self.fill_slots(id).await;
            resampled += 1;
        }
        Ok(resampled)
    }
}
