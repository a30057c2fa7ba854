//! Peer message types for transaction validation traffic.
//!
//! Every message exchanged between nodes for consensus is wrapped in
//! [`PeerMessage`]. Frames are encoded and decoded only through
//! [`PeerMessage::to_bytes`] and [`PeerMessage::from_bytes`].

use serde::{Deserialize, Serialize};
use std::fmt;
use tangle_types::TransactionId;

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("failed to encode peer message: {0}")]
    Encode(String),

    #[error("failed to decode peer message: {0}")]
    Decode(String),
}

/// Top-level validation wire message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerMessage {
    /// Ask the peer to validate a transaction and vote on it.
    ValidationRequest(ValidationRequest),
    /// The peer accepted the request; a vote follows.
    ValidationStart(ValidationRequest),
    /// The peer declined the request.
    ValidationReject(ValidationReject),
    /// The peer's verdict.
    ValidationVote(ValidationVote),
    /// Ask the peer to push a transaction (and its ancestry) to us.
    SyncRequest(SyncRequest),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub transaction_id: TransactionId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReject {
    pub transaction_id: TransactionId,
    pub reason: RejectReason,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVote {
    pub transaction_id: TransactionId,
    pub verdict: VoteVerdict,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub transaction_id: TransactionId,
}

/// Why a peer declined to validate for us.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The requester already holds a live lease for another transaction.
    LeaseHeld,
    /// The peer is already validating this transaction for us.
    DuplicateRequest,
    /// The peer is serving as many leases as it allows.
    AtCapacity,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::LeaseHeld => "lease_held",
            Self::DuplicateRequest => "duplicate_request",
            Self::AtCapacity => "at_capacity",
        };
        f.write_str(s)
    }
}

/// A peer's verdict on a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteVerdict {
    #[serde(rename = "valid")]
    Valid,
    #[serde(rename = "transaction_double_spend")]
    DoubleSpend,
    #[serde(rename = "transaction_not_found")]
    NotFound,
    #[serde(rename = "transaction_invalid")]
    Invalid,
    #[serde(rename = "transaction_invalid_amount")]
    InvalidAmount,
}

impl VoteVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::DoubleSpend => "transaction_double_spend",
            Self::NotFound => "transaction_not_found",
            Self::Invalid => "transaction_invalid",
            Self::InvalidAmount => "transaction_invalid_amount",
        }
    }

    /// Invalid-amount counts as invalid when tallying.
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid | Self::InvalidAmount)
    }
}

impl fmt::Display for VoteVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immediate answer to a validation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationReply {
    Start,
    Reject(RejectReason),
}

impl PeerMessage {
    pub fn transaction_id(&self) -> TransactionId {
        match self {
            Self::ValidationRequest(m) | Self::ValidationStart(m) => m.transaction_id,
            Self::ValidationReject(m) => m.transaction_id,
            Self::ValidationVote(m) => m.transaction_id,
            Self::SyncRequest(m) => m.transaction_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ValidationRequest(_) => "validation_request",
            Self::ValidationStart(_) => "validation_start",
            Self::ValidationReject(_) => "validation_reject",
            Self::ValidationVote(_) => "validation_vote",
            Self::SyncRequest(_) => "sync_request",
        }
    }

    /// Build the reply message for a validation request.
    pub fn reply(transaction_id: TransactionId, reply: ValidationReply) -> Self {
        match reply {
            ValidationReply::Start => Self::ValidationStart(ValidationRequest { transaction_id }),
            ValidationReply::Reject(reason) => Self::ValidationReject(ValidationReject {
                transaction_id,
                reason,
            }),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, MessageError> {
        bincode::serialize(self).map_err(|e| MessageError::Encode(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        bincode::deserialize(bytes).map_err(|e| MessageError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> TransactionId {
        TransactionId::new([7; 32])
    }

    #[test]
    fn vote_survives_the_wire() {
        let msg = PeerMessage::ValidationVote(ValidationVote {
            transaction_id: id(),
            verdict: VoteVerdict::InvalidAmount,
        });
        let decoded = PeerMessage::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.kind(), "validation_vote");
    }

    #[test]
    fn garbage_frame_is_a_decode_error() {
        assert!(matches!(
            PeerMessage::from_bytes(&[0xff, 0xff, 0xff, 0xff, 0x01]),
            Err(MessageError::Decode(_))
        ));
    }

    #[test]
    fn reply_maps_to_start_or_reject() {
        assert_eq!(
            PeerMessage::reply(id(), ValidationReply::Start),
            PeerMessage::ValidationStart(ValidationRequest { transaction_id: id() })
        );
        let reject = PeerMessage::reply(id(), ValidationReply::Reject(RejectReason::AtCapacity));
        assert_eq!(reject.kind(), "validation_reject");
        assert_eq!(reject.transaction_id(), id());
    }

    #[test]
    fn invalid_amount_tallies_as_invalid() {
        assert!(VoteVerdict::InvalidAmount.is_invalid());
        assert!(VoteVerdict::Invalid.is_invalid());
        assert!(!VoteVerdict::NotFound.is_invalid());
        assert_eq!(VoteVerdict::DoubleSpend.to_string(), "transaction_double_spend");
    }
}
