//! Events emitted by the consensus engine for subscribers.

use crate::error::FailureCause;
use crate::round::RoundOutcome;
use std::time::Duration;
use tangle_messages::VoteVerdict;
use tangle_types::{NodeId, TransactionId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsensusEvent {
    /// A transaction entered peer voting.
    RoundStarted { transaction_id: TransactionId },
    VoteReceived {
        transaction_id: TransactionId,
        peer: NodeId,
        verdict: VoteVerdict,
    },
    /// A vote arrived for no round, from an unsampled peer, or twice.
    VoteIgnored {
        transaction_id: TransactionId,
        peer: NodeId,
    },
    RoundFinished {
        transaction_id: TransactionId,
        outcome: RoundOutcome,
        rounds: u32,
        elapsed: Duration,
    },
    /// Local validation settled the transaction without voting.
    LocalRejection {
        transaction_id: TransactionId,
        cause: FailureCause,
    },
    /// A validation request to a peer failed.
    PeerRequestFailed { peer: NodeId, code: &'static str },
}

/// Synchronous fan-out event bus for consensus events.
///
/// Listeners run inline on the emitting task; keep them fast.
pub struct EventBus {
    listeners: Vec<Box<dyn Fn(&ConsensusEvent) + Send + Sync>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, listener: Box<dyn Fn(&ConsensusEvent) + Send + Sync>) {
        self.listeners.push(listener);
    }

    pub fn emit(&self, event: ConsensusEvent) {
        for listener in &self.listeners {
            listener(&event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn every_listener_sees_every_event() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::new();
        for _ in 0..2 {
            let seen = Arc::clone(&seen);
            bus.subscribe(Box::new(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }));
        }
        bus.emit(ConsensusEvent::RoundStarted {
            transaction_id: TransactionId::ZERO,
        });
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
