//! Consensus: deciding whether pending tangle transactions become stable.
//!
//! A pending transaction is first validated locally against its ancestry,
//! then put to a vote among a small random sample of peers. Rounds repeat
//! until a supermajority settles it as stable, double spent, timed out or
//! invalid, or the round budget runs out and it is retried later.
//!
//! ## Module overview
//!
//! - [`validator`]: Ancestor validation walking the transaction graph.
//! - [`double_spend`]: Oldest-valid-wins resolution of spending conflicts.
//! - [`round`]: Synchronous round book: sampling slots, votes, tallies.
//! - [`coordinator`]: Async driver of rounds over the peer transport.
//! - [`responder`]: Validation on behalf of peers, bounded by leases.
//! - [`scheduler`]: Selection of the next transaction to validate.
//! - [`rejected`]: Provisionally rejected transactions awaiting retry.
//! - [`event`]: Consensus events for metrics and logging subscribers.
//! - [`error`]: Failure taxonomy and consensus error types.

pub mod coordinator;
pub mod double_spend;
pub mod error;
pub mod event;
pub mod lease;
pub mod rejected;
pub mod responder;
pub mod round;
pub mod scheduler;
pub mod validator;
pub mod wallet;

pub use coordinator::{Coordinator, ProcessOutcome, TRANSACTION_LOCK};
pub use error::{ConsensusError, FailureCause, Rejection};
pub use event::{ConsensusEvent, EventBus};
pub use lease::{LeaseTicket, ValidationLease, ValidationLeases};
pub use rejected::RejectedRegistry;
pub use responder::ValidationResponder;
pub use round::{
    tally_votes, ConsensusRoundState, FinishedRound, RoundBook, RoundCounters, RoundOutcome,
    RoundVerdict, TallyResult, VoteOutcome,
};
pub use scheduler::{CycleOutcome, ValidationScheduler, SCHEDULER_LOCK};
pub use validator::{AncestorValidator, ValidationContext};
pub use wallet::WalletHooks;
