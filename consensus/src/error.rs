use std::fmt;
use tangle_messages::VoteVerdict;
use tangle_network::NetworkError;
use tangle_store::StoreError;
use tangle_types::TransactionId;
use tangle_utils::MutexError;
use thiserror::Error;

/// Why a transaction failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureCause {
    NotFound,
    Invalid,
    InvalidAmount,
    DoubleSpend,
    DoubleSpendUnresolved,
    MaxDepth,
    ConsensusTimeout,
    ProxyTimeLimitExceed,
}

impl FailureCause {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "transaction_not_found",
            Self::Invalid => "transaction_invalid",
            Self::InvalidAmount => "transaction_invalid_amount",
            Self::DoubleSpend => "transaction_double_spend",
            Self::DoubleSpendUnresolved => "transaction_double_spend_unresolved",
            Self::MaxDepth => "transaction_validation_max_depth",
            Self::ConsensusTimeout => "consensus_timeout",
            Self::ProxyTimeLimitExceed => "proxy_time_limit_exceed",
        }
    }

    /// Failure lies in the local graph itself; persisted as invalid at once.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Invalid | Self::InvalidAmount | Self::MaxDepth)
    }

    /// Failure depends on data we lack; re-sync and retry later.
    pub fn needs_resync(&self) -> bool {
        matches!(
            self,
            Self::NotFound
                | Self::DoubleSpendUnresolved
                | Self::ConsensusTimeout
                | Self::ProxyTimeLimitExceed
        )
    }

    /// Vote sent to a peer we validated for. `None` when the requester has
    /// already given up on us.
    pub fn verdict(&self) -> Option<VoteVerdict> {
        match self {
            Self::NotFound | Self::DoubleSpendUnresolved | Self::ProxyTimeLimitExceed => {
                Some(VoteVerdict::NotFound)
            }
            Self::Invalid | Self::MaxDepth => Some(VoteVerdict::Invalid),
            Self::InvalidAmount => Some(VoteVerdict::InvalidAmount),
            Self::DoubleSpend => Some(VoteVerdict::DoubleSpend),
            Self::ConsensusTimeout => None,
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A validation failure and the transaction it was detected at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("{cause} at {transaction_id}")]
pub struct Rejection {
    pub cause: FailureCause,
    pub transaction_id: TransactionId,
}

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("transaction rejected: {0}")]
    Rejected(Rejection),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("mutex error: {0}")]
    Mutex(#[from] MutexError),

    #[error("transaction {0} is already in consensus")]
    AlreadyInConsensus(TransactionId),

    #[error("round for {0} ended without an outcome")]
    RoundAbandoned(TransactionId),
}

impl ConsensusError {
    pub fn rejected(cause: FailureCause, transaction_id: TransactionId) -> Self {
        Self::Rejected(Rejection {
            cause,
            transaction_id,
        })
    }

    pub fn cause(&self) -> Option<FailureCause> {
        match self {
            Self::Rejected(r) => Some(r.cause),
            _ => None,
        }
    }
}
