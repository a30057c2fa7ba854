//! Stateless structural checks.
//!
//! Checks that need the ledger (referenced outputs, owners, amounts of the
//! spent outputs) belong to the ancestor validator in `tangle-consensus`.

use crate::error::TransactionError;
use crate::output::OutputRef;
use crate::Transaction;
use std::collections::HashSet;

/// First output reference that appears in more than one input, if any.
pub fn find_reused_output(tx: &Transaction) -> Option<OutputRef> {
    let mut seen = HashSet::with_capacity(tx.inputs.len());
    tx.inputs
        .iter()
        .map(|input| input.output)
        .find(|output| !seen.insert(*output))
}

/// Structural validity of a non-genesis transaction.
pub fn validate_structure(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.inputs.is_empty() {
        return Err(TransactionError::NoInputs(tx.id));
    }
    if tx.outputs.is_empty() {
        return Err(TransactionError::NoOutputs(tx.id));
    }
    if let Some(position) = tx.outputs.iter().position(|o| o.amount.is_zero()) {
        return Err(TransactionError::ZeroAmount {
            id: tx.id,
            position: position as u32,
        });
    }
    if let Some(output) = find_reused_output(tx) {
        return Err(TransactionError::OutputReused {
            id: tx.id,
            output: output.to_string(),
        });
    }
    Ok(())
}
