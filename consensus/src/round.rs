//! Consensus round bookkeeping.
//!
//! [`RoundBook`] owns the state of every transaction currently in consensus.
//! It is synchronous and does no I/O: the coordinator asks it which peer
//! slots are open, records assignments and votes, and gets back what the
//! votes mean. A transaction moves through
//! `not_started -> round_active -> (stable | invalid | double_spend | timeout | rejected_retry)`.
//!
//! A round completes once every sampled peer has voted. The votes are then
//! tallied:
//!
//! 1. If there is positive evidence (a `valid` or `double_spend` vote in this
//!    round, or a counted valid/double-spend round earlier), peers voting
//!    `not_found` or `invalid` are behind or wrong; they are discarded and
//!    their slots re-sampled.
//! 2. Otherwise a two-thirds supermajority, checked in the order valid,
//!    double spend, not found, invalid, counts the round for that category.
//! 3. Counters are checked against the terminal thresholds. If none is met
//!    the next round starts, until the round budget runs out.

use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tangle_messages::VoteVerdict;
use tangle_types::{ConsensusParams, NodeId, TransactionId};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Terminal result of a transaction's consensus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RoundOutcome {
    Stable,
    DoubleSpend,
    Timeout,
    Invalid,
    /// Rounds exhausted without a verdict; retried later.
    RejectedRetry,
}

impl RoundOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::DoubleSpend => "double_spend",
            Self::Timeout => "timeout",
            Self::Invalid => "invalid",
            Self::RejectedRetry => "rejected_retry",
        }
    }
}

/// Rounds counted per category so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoundCounters {
    pub validation: u32,
    pub double_spend: u32,
    pub not_found: u32,
    pub invalid: u32,
}

impl RoundCounters {
    pub fn has_positive_evidence(&self) -> bool {
        self.validation > 0 || self.double_spend > 0
    }
}

/// Meaning of one complete set of votes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoundVerdict {
    /// These voters contradict positive evidence and must be replaced.
    DiscardMinority(Vec<NodeId>),
    Valid,
    DoubleSpend,
    NotFound,
    Invalid,
    Inconclusive,
}

/// Tally a complete set of votes against the transaction's history.
pub fn tally_votes(votes: &[(NodeId, VoteVerdict)], history: &RoundCounters) -> RoundVerdict {
    let total = votes.len();
    let count = |pred: fn(&VoteVerdict) -> bool| votes.iter().filter(|(_, v)| pred(v)).count();
    let valid = count(|v| *v == VoteVerdict::Valid);
    let double_spend = count(|v| *v == VoteVerdict::DoubleSpend);
    let not_found = count(|v| *v == VoteVerdict::NotFound);
    let invalid = count(VoteVerdict::is_invalid);

    if valid > 0 || double_spend > 0 || history.has_positive_evidence() {
        let mut minority: Vec<NodeId> = votes
            .iter()
            .filter(|(_, v)| *v == VoteVerdict::NotFound || v.is_invalid())
            .map(|(peer, _)| peer.clone())
            .collect();
        if !minority.is_empty() {
            minority.sort();
            return RoundVerdict::DiscardMinority(minority);
        }
    }

    if ConsensusParams::is_supermajority(valid, total) {
        RoundVerdict::Valid
    } else if ConsensusParams::is_supermajority(double_spend, total) {
        RoundVerdict::DoubleSpend
    } else if ConsensusParams::is_supermajority(not_found, total) {
        RoundVerdict::NotFound
    } else if ConsensusParams::is_supermajority(invalid, total) {
        RoundVerdict::Invalid
    } else {
        RoundVerdict::Inconclusive
    }
}

/// What the coordinator should do after a tally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TallyResult {
    /// Minority voters were discarded; refill their slots.
    Resample { discarded: Vec<NodeId> },
    /// The next round started with empty slots.
    NextRound { round: u32 },
    Finished(RoundOutcome),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoteOutcome {
    /// No round, peer not sampled this round, or peer already voted.
    Ignored,
    Recorded,
    Tallied(TallyResult),
}

#[derive(Clone, Debug)]
struct PeerSlot {
    assigned_at: Instant,
    started: bool,
    response: Option<VoteVerdict>,
}

/// Consensus state of one transaction.
#[derive(Debug)]
pub struct ConsensusRoundState {
    round: u32,
    slots: HashMap<NodeId, PeerSlot>,
    counters: RoundCounters,
    discarded: HashSet<NodeId>,
    started_at: Instant,
    last_activity: Instant,
    resolve: Option<oneshot::Sender<RoundOutcome>>,
    tasks: Vec<AbortHandle>,
}

impl ConsensusRoundState {
    fn new(now: Instant, resolve: oneshot::Sender<RoundOutcome>) -> Self {
        Self {
            round: 1,
            slots: HashMap::new(),
            counters: RoundCounters::default(),
            discarded: HashSet::new(),
            started_at: now,
            last_activity: now,
            resolve: Some(resolve),
            tasks: Vec::new(),
        }
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn counters(&self) -> RoundCounters {
        self.counters
    }

    pub fn is_discarded(&self, peer: &NodeId) -> bool {
        self.discarded.contains(peer)
    }

    fn responses(&self) -> Vec<(NodeId, VoteVerdict)> {
        self.slots
            .iter()
            .filter_map(|(peer, slot)| slot.response.map(|v| (peer.clone(), v)))
            .collect()
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

/// A round removed from the book, waiting for its outcome to be delivered.
#[derive(Debug)]
pub struct FinishedRound {
    pub transaction_id: TransactionId,
    pub outcome: RoundOutcome,
    pub rounds: u32,
    pub elapsed: Duration,
    resolve: Option<oneshot::Sender<RoundOutcome>>,
}

impl FinishedRound {
    /// Hand the outcome to whoever started the round.
    pub fn resolve(mut self) {
        if let Some(tx) = self.resolve.take() {
            let _ = tx.send(self.outcome);
        }
    }
}

#[derive(Debug)]
pub struct RoundBook {
    rounds: HashMap<TransactionId, ConsensusRoundState>,
    node_count: usize,
    validation_required: u32,
    validation_max: u32,
    double_spend_max: u32,
    not_found_max: u32,
}

impl RoundBook {
    pub fn new(params: &ConsensusParams) -> Self {
        Self {
            rounds: HashMap::new(),
            node_count: params.round_node_count,
            validation_required: params.validation_required,
            validation_max: params.validation_max,
            double_spend_max: params.double_spend_max,
            not_found_max: params.not_found_max,
        }
    }

    /// Open consensus for `id`. `None` if it is already in consensus.
    pub fn begin_round(
        &mut self,
        id: TransactionId,
        now: Instant,
    ) -> Option<oneshot::Receiver<RoundOutcome>> {
        if self.rounds.contains_key(&id) {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        self.rounds.insert(id, ConsensusRoundState::new(now, tx));
        Some(rx)
    }

    pub fn is_active(&self, id: &TransactionId) -> bool {
        self.rounds.contains_key(id)
    }

    pub fn active_count(&self) -> usize {
        self.rounds.len()
    }

    pub fn state(&self, id: &TransactionId) -> Option<&ConsensusRoundState> {
        self.rounds.get(id)
    }

    pub fn open_slots(&self, id: &TransactionId) -> usize {
        self.rounds
            .get(id)
            .map(|s| self.node_count.saturating_sub(s.slots.len()))
            .unwrap_or(0)
    }

    /// Peers that must not be sampled for `id` right now.
    pub fn excluded_peers(&self, id: &TransactionId) -> HashSet<NodeId> {
        self.rounds
            .get(id)
            .map(|s| s.discarded.iter().chain(s.slots.keys()).cloned().collect())
            .unwrap_or_default()
    }

    pub fn assign_peer(&mut self, id: &TransactionId, peer: NodeId, now: Instant) -> bool {
        let node_count = self.node_count;
        let Some(state) = self.rounds.get_mut(id) else {
            return false;
        };
        if state.slots.len() >= node_count
            || state.discarded.contains(&peer)
            || state.slots.contains_key(&peer)
        {
            return false;
        }
        state.slots.insert(
            peer,
            PeerSlot {
                assigned_at: now,
                started: false,
                response: None,
            },
        );
        state.last_activity = now;
        true
    }

    pub fn track_task(&mut self, id: &TransactionId, task: AbortHandle) {
        match self.rounds.get_mut(id) {
            Some(state) => {
                state.tasks.retain(|t| !t.is_finished());
                state.tasks.push(task);
            }
            None => task.abort(),
        }
    }


    /// The peer accepted the request and is validating.
    pub fn mark_started(&mut self, id: &TransactionId, peer: &NodeId) -> bool {
        match self.rounds.get_mut(id).and_then(|s| s.slots.get_mut(peer)) {
            Some(slot) => {
                slot.started = true;
                true
            }
            None => false,
        }
    }

    /// Free the slot of a peer whose request failed. With `discard` the peer
    /// is kept out for the rest of this consensus; without it the peer may be
    /// sampled again once its cool-down ends. Votes already cast stay.
    pub fn vacate_slot(&mut self, id: &TransactionId, peer: &NodeId, discard: bool) -> bool {
        let Some(state) = self.rounds.get_mut(id) else {
            return false;
        };
        match state.slots.get(peer) {
            Some(slot) if slot.response.is_none() => {
                state.slots.remove(peer);
                if discard {
                    state.discarded.insert(peer.clone());
                }
                true
            }
            _ => false,
        }
    }

    pub fn record_vote(
        &mut self,
        id: &TransactionId,
        peer: &NodeId,
        verdict: VoteVerdict,
        now: Instant,
    ) -> VoteOutcome {
        let node_count = self.node_count;
        let Some(state) = self.rounds.get_mut(id) else {
            return VoteOutcome::Ignored;
        };
        let Some(slot) = state.slots.get_mut(peer) else {
            return VoteOutcome::Ignored;
        };
        if slot.response.is_some() {
            return VoteOutcome::Ignored;
        }
        slot.response = Some(verdict);
        state.last_activity = now;

        let responses = state.slots.values().filter(|s| s.response.is_some()).count();
        if responses < node_count {
            return VoteOutcome::Recorded;
        }
        VoteOutcome::Tallied(self.tally(id))
    }

    fn tally(&mut self, id: &TransactionId) -> TallyResult {
        let Some(state) = self.rounds.get_mut(id) else {
            return TallyResult::Finished(RoundOutcome::RejectedRetry);
        };
        let votes = state.responses();

        match tally_votes(&votes, &state.counters) {
            RoundVerdict::DiscardMinority(discarded) => {
                for peer in &discarded {
                    state.slots.remove(peer);
                    state.discarded.insert(peer.clone());
                }
                return TallyResult::Resample { discarded };
            }
            RoundVerdict::Valid => state.counters.validation += 1,
            RoundVerdict::DoubleSpend => state.counters.double_spend += 1,
            RoundVerdict::NotFound => state.counters.not_found += 1,
            RoundVerdict::Invalid => state.counters.invalid += 1,
            RoundVerdict::Inconclusive => {}
        }

        let c = state.counters;
        let outcome = if c.validation >= self.validation_required {
            Some(RoundOutcome::Stable)
        } else if c.double_spend >= self.double_spend_max {
            Some(RoundOutcome::DoubleSpend)
        } else if c.not_found >= self.not_found_max {
            Some(RoundOutcome::Timeout)
        } else if c.invalid >= self.double_spend_max && !c.has_positive_evidence() {
            Some(RoundOutcome::Invalid)
        } else if state.round >= self.validation_max {
            Some(RoundOutcome::RejectedRetry)
        } else {
            None
        };

        match outcome {
            Some(outcome) => TallyResult::Finished(outcome),
            None => match self.advance_round(id) {
                Some(round) => TallyResult::NextRound { round },
                None => TallyResult::Finished(RoundOutcome::RejectedRetry),
            },
        }
    }

    /// Start the next round: clear the slots, discarding peers that were
    /// sampled but never voted.
    pub fn advance_round(&mut self, id: &TransactionId) -> Option<u32> {
        let state = self.rounds.get_mut(id)?;
        for (peer, slot) in state.slots.drain() {
            if slot.response.is_none() {
                state.discarded.insert(peer);
            }
        }
        state.round += 1;
        Some(state.round)
    }

    /// Remove the round, aborting its peer tasks. The caller delivers the
    /// outcome with [`FinishedRound::resolve`] once it is persisted.
    pub fn end_round(
        &mut self,
        id: &TransactionId,
        outcome: RoundOutcome,
        now: Instant,
    ) -> Option<FinishedRound> {
        let mut state = self.rounds.remove(id)?;
        state.abort_tasks();
        Some(FinishedRound {
            transaction_id: *id,
            outcome,
            rounds: state.round,
            elapsed: now.saturating_duration_since(state.started_at),
            resolve: state.resolve.take(),
        })
    }

    /// Drop a round without an outcome; its waiter sees the channel close.
    pub fn discard_round(&mut self, id: &TransactionId) -> bool {
        match self.rounds.remove(id) {
            Some(mut state) => {
                state.abort_tasks();
                true
            }
            None => false,
        }
    }

    /// For rounds idle for `idle`, discard peers that never answered and
    /// return the ids that now have open slots.
    pub fn purge_stale(&mut self, now: Instant, idle: Duration) -> Vec<TransactionId> {
        let node_count = self.node_count;
        let mut resample = Vec::new();
        for (id, state) in self.rounds.iter_mut() {
            if now.saturating_duration_since(state.last_activity) < idle {
                continue;
            }
            let silent: Vec<NodeId> = state
                .slots
                .iter()
                .filter(|(_, slot)| slot.response.is_none())
                .map(|(peer, _)| peer.clone())
                .collect();
            for peer in silent {
                if let Some(slot) = state.slots.remove(&peer) {
                    tracing::debug!(
                        tx = %id,
                        peer = %peer,
                        accepted = slot.started,
                        waited = ?now.saturating_duration_since(slot.assigned_at),
                        "discarding silent peer"
                    );
                }
                state.discarded.insert(peer);
            }
            state.last_activity = now;
            if state.slots.len() < node_count {
                resample.push(*id);
            }
        }
        resample
    }

    /// Rounds running longer than `max_age`.
    pub fn overdue(&self, now: Instant, max_age: Duration) -> Vec<TransactionId> {
        self.rounds
            .iter()
            .filter(|(_, s)| now.saturating_duration_since(s.started_at) >= max_age)
            .map(|(id, _)| *id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id() -> TransactionId {
        TransactionId::new([9; 32])
    }

    fn peer(n: u8) -> NodeId {
        NodeId::new(format!("peer-{n}"))
    }

    fn book() -> RoundBook {
        RoundBook::new(&ConsensusParams::default())
    }

    fn sample(book: &mut RoundBook, peers: &[u8], now: Instant) {
        for &p in peers {
            assert!(book.assign_peer(&id(), peer(p), now));
        }
    }

    /// Run one full round with the given votes from fresh peers.
    fn vote_round(book: &mut RoundBook, first_peer: u8, votes: &[VoteVerdict]) -> VoteOutcome {
        let now = Instant::now();
        let peers: Vec<u8> = (first_peer..first_peer + votes.len() as u8).collect();
        sample(book, &peers, now);
        let mut last = VoteOutcome::Ignored;
        for (p, v) in peers.iter().zip(votes) {
            last = book.record_vote(&id(), &peer(*p), *v, now);
        }
        last
    }

    use VoteVerdict::{DoubleSpend as D, Invalid as I, NotFound as N, Valid as V};

    #[test]
    fn begin_round_is_singleton() {
        let mut b = book();
        assert!(b.begin_round(id(), Instant::now()).is_some());
        assert!(b.begin_round(id(), Instant::now()).is_none());
        assert_eq!(b.active_count(), 1);
        assert_eq!(b.open_slots(&id()), 3);
    }

    #[test]
    fn slots_are_capped_and_unique() {
        let mut b = book();
        let now = Instant::now();
        b.begin_round(id(), now);
        sample(&mut b, &[1, 2, 3], now);
        assert!(!b.assign_peer(&id(), peer(4), now));
        assert!(b.excluded_peers(&id()).contains(&peer(2)));
        assert_eq!(b.open_slots(&id()), 0);
    }

    #[test]
    fn votes_from_unsampled_or_repeat_peers_are_ignored() {
        let mut b = book();
        let now = Instant::now();
        b.begin_round(id(), now);
        sample(&mut b, &[1, 2, 3], now);
        assert_eq!(b.record_vote(&id(), &peer(7), V, now), VoteOutcome::Ignored);
        assert_eq!(b.record_vote(&id(), &peer(1), V, now), VoteOutcome::Recorded);
        assert_eq!(b.record_vote(&id(), &peer(1), V, now), VoteOutcome::Ignored);
        assert_eq!(
            b.record_vote(&TransactionId::ZERO, &peer(1), V, now),
            VoteOutcome::Ignored
        );
    }

    #[test]
    fn two_valid_then_timeout_leaves_one_slot_to_resample() {
        let mut b = book();
        let now = Instant::now();
        b.begin_round(id(), now);
        sample(&mut b, &[1, 2, 3], now);
        b.record_vote(&id(), &peer(1), V, now);
        b.record_vote(&id(), &peer(2), V, now);
        assert!(b.vacate_slot(&id(), &peer(3), true));
        assert!(!b.vacate_slot(&id(), &peer(1), true));
        assert_eq!(b.open_slots(&id()), 1);
        assert!(b.excluded_peers(&id()).contains(&peer(3)));
        assert_eq!(b.state(&id()).map(|s| s.counters()), Some(RoundCounters::default()));
    }

    #[test]
    fn vacated_without_discard_can_be_sampled_again() {
        let mut b = book();
        let now = Instant::now();
        b.begin_round(id(), now);
        sample(&mut b, &[1, 2, 3], now);
        assert!(b.vacate_slot(&id(), &peer(3), false));
        assert_eq!(b.open_slots(&id()), 1);
        assert!(!b.excluded_peers(&id()).contains(&peer(3)));
        assert!(!b.state(&id()).is_some_and(|s| s.is_discarded(&peer(3))));
        assert!(b.assign_peer(&id(), peer(3), now));
    }

    #[tokio::test]
    async fn finished_tasks_are_dropped_when_tracking_new_ones() {
        let mut b = book();
        b.begin_round(id(), Instant::now());
        for _ in 0..4 {
            let task = tokio::spawn(async {});
            let handle = task.abort_handle();
            task.await.unwrap();
            b.track_task(&id(), handle);
        }
        assert_eq!(b.state(&id()).map(|s| s.tasks.len()), Some(1));

        let pending = tokio::spawn(std::future::pending::<()>());
        b.track_task(&id(), pending.abort_handle());
        let tasks = b.state(&id()).map(|s| s.tasks.len());
        assert_eq!(tasks, Some(1));
        b.end_round(&id(), RoundOutcome::RejectedRetry, Instant::now());
        assert!(pending.await.unwrap_err().is_cancelled());
    }

    #[test]
    fn two_valid_rounds_are_stable() {
        let mut b = book();
        b.begin_round(id(), Instant::now());
        assert_eq!(
            vote_round(&mut b, 1, &[V, V, V]),
            VoteOutcome::Tallied(TallyResult::NextRound { round: 2 })
        );
        assert_eq!(
            vote_round(&mut b, 1, &[V, V, D]),
            VoteOutcome::Tallied(TallyResult::Finished(RoundOutcome::Stable))
        );
    }

    #[test]
    fn five_double_spend_rounds_are_final() {
        let mut b = book();
        b.begin_round(id(), Instant::now());
        for round in 2..=5 {
            assert_eq!(
                vote_round(&mut b, 1, &[D, D, D]),
                VoteOutcome::Tallied(TallyResult::NextRound { round })
            );
        }
        assert_eq!(
            vote_round(&mut b, 1, &[D, D, V]),
            VoteOutcome::Tallied(TallyResult::Finished(RoundOutcome::DoubleSpend))
        );
    }

    #[test]
    fn not_found_next_to_valid_is_discarded() {
        let mut b = book();
        b.begin_round(id(), Instant::now());
        assert_eq!(
            vote_round(&mut b, 1, &[V, V, N]),
            VoteOutcome::Tallied(TallyResult::Resample {
                discarded: vec![peer(3)]
            })
        );
        assert_eq!(b.open_slots(&id()), 1);
        assert!(b.excluded_peers(&id()).contains(&peer(3)));
        assert!(!b.assign_peer(&id(), peer(3), Instant::now()));
    }

    #[test]
    fn invalid_after_valid_history_is_discarded() {
        let mut b = book();
        b.begin_round(id(), Instant::now());
        vote_round(&mut b, 1, &[V, V, V]);
        assert_eq!(
            vote_round(&mut b, 1, &[I, I, I]),
            VoteOutcome::Tallied(TallyResult::Resample {
                discarded: vec![peer(1), peer(2), peer(3)]
            })
        );
    }

    #[test]
    fn not_found_only_rounds_time_out() {
        let mut b = book();
        b.begin_round(id(), Instant::now());
        for _ in 0..4 {
            vote_round(&mut b, 1, &[N, N, N]);
        }
        assert_eq!(
            vote_round(&mut b, 1, &[N, N, N]),
            VoteOutcome::Tallied(TallyResult::Finished(RoundOutcome::Timeout))
        );
    }

    #[test]
    fn invalid_rounds_without_evidence_are_invalid() {
        let mut b = book();
        b.begin_round(id(), Instant::now());
        for _ in 0..4 {
            vote_round(&mut b, 1, &[I, VoteVerdict::InvalidAmount, I]);
        }
        assert_eq!(
            vote_round(&mut b, 1, &[I, I, N]),
            VoteOutcome::Tallied(TallyResult::Finished(RoundOutcome::Invalid))
        );
    }

    #[test]
    fn mixed_rounds_exhaust_into_rejected_retry() {
        let mut b = book();
        b.begin_round(id(), Instant::now());
        assert_eq!(
            vote_round(&mut b, 1, &[V, V, V]),
            VoteOutcome::Tallied(TallyResult::NextRound { round: 2 })
        );
        for round in 3..=5 {
            assert_eq!(
                vote_round(&mut b, 1, &[D, D, D]),
                VoteOutcome::Tallied(TallyResult::NextRound { round })
            );
        }
        assert_eq!(
            vote_round(&mut b, 1, &[D, D, D]),
            VoteOutcome::Tallied(TallyResult::Finished(RoundOutcome::RejectedRetry))
        );
    }

    #[test]
    fn split_positive_votes_are_inconclusive() {
        let votes = vec![(peer(1), V), (peer(2), D), (peer(3), V), (peer(4), D)];
        assert_eq!(
            tally_votes(&votes, &RoundCounters::default()),
            RoundVerdict::Inconclusive
        );
    }

    #[tokio::test]
    async fn end_round_resolves_and_aborts() {
        let mut b = book();
        let now = Instant::now();
        let rx = b.begin_round(id(), now).unwrap();
        let task = tokio::spawn(std::future::pending::<()>());
        b.track_task(&id(), task.abort_handle());

        let finished = b.end_round(&id(), RoundOutcome::Stable, now).unwrap();
        assert!(!b.is_active(&id()));
        finished.resolve();
        assert_eq!(rx.await.unwrap(), RoundOutcome::Stable);
        assert!(task.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn discarded_round_closes_its_channel() {
        let mut b = book();
        let rx = b.begin_round(id(), Instant::now()).unwrap();
        assert!(b.discard_round(&id()));
        assert!(rx.await.is_err());
    }

    #[test]
    fn stale_rounds_drop_silent_peers() {
        let mut b = book();
        let start = Instant::now();
        b.begin_round(id(), start);
        sample(&mut b, &[1, 2, 3], start);
        b.record_vote(&id(), &peer(1), V, start);

        assert!(b.purge_stale(start + Duration::from_secs(10), Duration::from_secs(30)).is_empty());
        let resample = b.purge_stale(start + Duration::from_secs(30), Duration::from_secs(30));
        assert_eq!(resample, vec![id()]);
        assert_eq!(b.open_slots(&id()), 2);
        assert!(b.state(&id()).unwrap().is_discarded(&peer(2)));
    }

    #[test]
    fn overdue_rounds_are_reported() {
        let mut b = book();
        let start = Instant::now();
        b.begin_round(id(), start);
        assert!(b.overdue(start + Duration::from_secs(10), Duration::from_secs(60)).is_empty());
        assert_eq!(b.overdue(start + Duration::from_secs(60), Duration::from_secs(60)), vec![id()]);
    }

    fn verdict() -> impl Strategy<Value = VoteVerdict> {
        prop_oneof![
            Just(VoteVerdict::Valid),
            Just(VoteVerdict::DoubleSpend),
            Just(VoteVerdict::NotFound),
            Just(VoteVerdict::Invalid),
            Just(VoteVerdict::InvalidAmount),
        ]
    }

    fn counters() -> impl Strategy<Value = RoundCounters> {
        (0u32..3, 0u32..3, 0u32..3, 0u32..3).prop_map(|(validation, double_spend, not_found, invalid)| {
            RoundCounters {
                validation,
                double_spend,
                not_found,
                invalid,
            }
        })
    }

    proptest! {
        #[test]
        fn tally_ignores_vote_order(
            verdicts in prop::collection::vec(verdict(), 1..8),
            history in counters(),
        ) {
            let votes: Vec<(NodeId, VoteVerdict)> =
                verdicts.iter().enumerate().map(|(i, v)| (peer(i as u8), *v)).collect();
            let mut reversed = votes.clone();
            reversed.reverse();
            prop_assert_eq!(tally_votes(&votes, &history), tally_votes(&reversed, &history));
        }

        #[test]
        fn discarded_voters_never_voted_positively(
            verdicts in prop::collection::vec(verdict(), 1..8),
            history in counters(),
        ) {
            let votes: Vec<(NodeId, VoteVerdict)> =
                verdicts.iter().enumerate().map(|(i, v)| (peer(i as u8), *v)).collect();
            if let RoundVerdict::DiscardMinority(discarded) = tally_votes(&votes, &history) {
                for p in discarded {
                    let (_, v) = votes.iter().find(|(q, _)| *q == p).unwrap();
                    prop_assert!(*v == VoteVerdict::NotFound || v.is_invalid());
                }
            }
        }

        #[test]
        fn counted_category_holds_two_thirds(
            verdicts in prop::collection::vec(verdict(), 1..8),
        ) {
            let votes: Vec<(NodeId, VoteVerdict)> =
                verdicts.iter().enumerate().map(|(i, v)| (peer(i as u8), *v)).collect();
            let total = votes.len();
            let share = |pred: fn(&VoteVerdict) -> bool| {
                votes.iter().filter(|(_, v)| pred(v)).count() * 3 >= total * 2
            };
            match tally_votes(&votes, &RoundCounters::default()) {
                RoundVerdict::Valid => prop_assert!(share(|v| *v == VoteVerdict::Valid)),
                RoundVerdict::DoubleSpend => prop_assert!(share(|v| *v == VoteVerdict::DoubleSpend)),
                RoundVerdict::NotFound => prop_assert!(share(|v| *v == VoteVerdict::NotFound)),
                RoundVerdict::Invalid => prop_assert!(share(VoteVerdict::is_invalid)),
                _ => {}
            }
        }
    }
}
