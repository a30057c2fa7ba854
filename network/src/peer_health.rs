//! Per-peer health: rejection cool-downs and consecutive request timeouts.

use crate::PeerInfo;
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tangle_types::NodeId;
use tokio::time::Instant;

#[derive(Clone, Debug, Default)]
struct PeerRecord {
    consecutive_timeouts: u32,
    cool_down_until: Option<Instant>,
}

/// Tracks which peers may be sampled for a validation round.
#[derive(Debug)]
pub struct PeerHealth {
    peers: HashMap<NodeId, PeerRecord>,
    /// Consecutive timeouts after which the peer is rotated.
    timeout_max: u32,
    cool_down: Duration,
}

impl PeerHealth {
    pub fn new(timeout_max: u32, cool_down: Duration) -> Self {
        Self {
            peers: HashMap::new(),
            timeout_max,
            cool_down,
        }
    }

    /// Put `peer` on cool-down after it rejected a request.
    pub fn cool_down(&mut self, peer: &NodeId, now: Instant) {
        let record = self.peers.entry(peer.clone()).or_default();
        record.cool_down_until = Some(now + self.cool_down);
        tracing::debug!(peer = %peer, secs = self.cool_down.as_secs(), "peer cooling down");
    }

    pub fn is_cooling_down(&self, peer: &NodeId, now: Instant) -> bool {
        self.peers
            .get(peer)
            .and_then(|r| r.cool_down_until)
            .is_some_and(|until| now < until)
    }

    /// Record a request timeout. Returns `true` when the peer reached the
    /// consecutive-timeout ceiling; its counter is reset so the caller rotates
    /// it exactly once.
    pub fn record_timeout(&mut self, peer: &NodeId) -> bool {
        let record = self.peers.entry(peer.clone()).or_default();
        record.consecutive_timeouts += 1;
        if record.consecutive_timeouts >= self.timeout_max {
            record.consecutive_timeouts = 0;
            tracing::warn!(peer = %peer, max = self.timeout_max, "peer timed out repeatedly");
            return true;
        }
        false
    }

    /// A peer answered; its timeout streak ends.
    pub fn record_response(&mut self, peer: &NodeId) {
        if let Some(record) = self.peers.get_mut(peer) {
            record.consecutive_timeouts = 0;
        }
    }

    pub fn consecutive_timeouts(&self, peer: &NodeId) -> u32 {
        self.peers
            .get(peer)
            .map(|r| r.consecutive_timeouts)
            .unwrap_or(0)
    }

    /// Drop everything known about a peer whose connection is gone.
    pub fn forget(&mut self, peer: &NodeId) {
        self.peers.remove(peer);
    }

    /// Drop expired cool-downs and records with nothing left to track.
    pub fn purge(&mut self, now: Instant) {
        self.peers.retain(|_, record| {
            if record.cool_down_until.is_some_and(|until| now >= until) {
                record.cool_down_until = None;
            }
            record.cool_down_until.is_some() || record.consecutive_timeouts > 0
        });
    }

    /// Pick up to `count` random ready peers that are neither in `exclude`
    /// nor cooling down.
    pub fn select_candidates(
        &self,
        peers: &[PeerInfo],
        exclude: &HashSet<NodeId>,
        count: usize,
        now: Instant,
    ) -> Vec<NodeId> {
        let mut eligible: Vec<NodeId> = peers
            .iter()
            .filter(|p| p.ready && !exclude.contains(&p.id) && !self.is_cooling_down(&p.id, now))
            .map(|p| p.id.clone())
            .collect();
        eligible.shuffle(&mut rand::thread_rng());
        eligible.truncate(count);
        eligible
    }
}
