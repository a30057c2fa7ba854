//! Transaction model for the tangle ledger.
//!
//! A transaction spends previously created outputs (its inputs), creates new
//! outputs, and references parent transactions in the DAG. Its id is the
//! Blake2b digest of the signed content, so any tampering changes the id.
//!
//! - [`output`]: output references and per-output ledger state.
//! - [`signing`]: id computation, the signing builder, integrity checks.
//! - [`date`]: normalisation of legacy transaction dates.
//! - [`validation`]: stateless structural checks.

pub mod date;
pub mod error;
pub mod output;
pub mod signing;
pub mod validation;

pub use date::{normalize_transaction_date, CURRENT_VERSION, LEGACY_MILLIS_VERSION};
pub use error::TransactionError;
pub use output::{OutputRef, OutputState, TransactionOutput};
pub use signing::{compute_transaction_id, signing_hash, verify_integrity, TransactionBuilder};
pub use validation::{find_reused_output, validate_structure};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tangle_types::{Address, Amount, PublicKey, Signature, Timestamp, TransactionId};

/// Consensus status stored alongside a transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Not yet decided by consensus.
    #[default]
    Pending,
    /// Network-agreed valid. Terminal.
    Stable,
    /// Rejected for good (bad graph, bad amounts, lost a double spend).
    Invalid,
    /// Ancestors could not be found by the network in time.
    Timeout,
}

/// One spent output, claimed by `address` and authorised by `signature`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub output: OutputRef,
    pub address: Address,
    pub public_key: PublicKey,
    pub signature: Signature,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub version: u16,
    /// Creation date. Canonical form is seconds; see [`date`].
    pub transaction_date: Timestamp,
    pub parents: Vec<TransactionId>,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,

    // ── Ledger state (not part of the signed content) ───────────────────
    #[serde(default)]
    pub status: TransactionStatus,
    #[serde(default)]
    pub is_stable: bool,
    #[serde(default)]
    pub is_timeout: bool,
    #[serde(default)]
    pub is_double_spend: bool,
}

impl Transaction {
    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    /// Sum of all output amounts.
    pub fn output_total(&self) -> Amount {
        self.outputs.iter().map(|o| o.amount).sum()
    }

    /// Distinct transactions whose outputs this transaction spends, in
    /// first-seen input order.
    pub fn source_transactions(&self) -> Vec<TransactionId> {
        let mut seen = BTreeSet::new();
        self.inputs
            .iter()
            .map(|input| input.output.transaction_id)
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Every address touched by this transaction (input claimants and output
    /// owners), deduplicated and sorted.
    pub fn addresses(&self) -> Vec<Address> {
        let set: BTreeSet<Address> = self
            .inputs
            .iter()
            .map(|i| i.address.clone())
            .chain(self.outputs.iter().map(|o| o.address.clone()))
            .collect();
        set.into_iter().collect()
    }

    /// Whether any output of this transaction is flagged as double spent.
    pub fn has_double_spent_output(&self) -> bool {
        self.outputs.iter().any(|o| o.state.is_double_spend)
    }

    /// Date in canonical seconds, regardless of the version that produced it.
    pub fn normalized_date(&self) -> Timestamp {
        normalize_transaction_date(self.version, self.transaction_date.as_secs())
    }

    /// Rewrite `transaction_date` into canonical seconds in place.
    pub fn normalize_date(&mut self) {
        self.transaction_date = self.normalized_date();
    }

    /// Whether this transaction is final and clean, i.e. needs no more checks.
    pub fn is_settled(&self) -> bool {
        self.is_stable && !self.is_double_spend && !self.has_double_spent_output()
    }
}
