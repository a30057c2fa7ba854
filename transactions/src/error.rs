use tangle_types::TransactionId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("transaction {0} has no inputs")]
    NoInputs(TransactionId),

    #[error("transaction {0} has no outputs")]
    NoOutputs(TransactionId),

    #[error("transaction {id} output {position} has zero amount")]
    ZeroAmount { id: TransactionId, position: u32 },

    #[error("transaction {id} spends output {output} more than once")]
    OutputReused { id: TransactionId, output: String },

    #[error("transaction {id} input {position}: address does not match public key")]
    AddressMismatch { id: TransactionId, position: u32 },

    #[error("invalid signature on transaction {id} input {position}")]
    InvalidSignature { id: TransactionId, position: u32 },

    #[error("transaction id mismatch: claimed {claimed}, computed {computed}")]
    IdMismatch {
        claimed: TransactionId,
        computed: TransactionId,
    },

    #[error("serialization error: {0}")]
    Serialization(String),
}
