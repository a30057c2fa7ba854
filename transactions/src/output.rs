//! Output references and per-output ledger state.

use serde::{Deserialize, Serialize};
use std::fmt;
use tangle_types::{Address, Amount, TransactionId};

/// Points at output `position` of transaction `transaction_id`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    pub transaction_id: TransactionId,
    pub position: u32,
}

impl OutputRef {
    pub fn new(transaction_id: TransactionId, position: u32) -> Self {
        Self {
            transaction_id,
            position,
        }
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transaction_id, self.position)
    }
}

/// Mutable ledger flags of an output. Never part of the signed content.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputState {
    pub is_spent: bool,
    pub is_double_spend: bool,
    pub is_stable: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub address: Address,
    pub amount: Amount,
    #[serde(default)]
    pub state: OutputState,
}

impl TransactionOutput {
    pub fn new(address: Address, amount: Amount) -> Self {
        Self {
            address,
            amount,
            state: OutputState::default(),
        }
    }
}
