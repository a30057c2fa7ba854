//! Transaction ids, signing and integrity verification.
//!
//! The signing hash covers the version, date, parents, every input's output
//! reference, claimed address and public key, and every output's address and
//! amount. The id is `Blake2b(signing_hash || signature_0 || ... )`.

use crate::error::TransactionError;
use crate::output::{OutputRef, TransactionOutput};
use crate::{Transaction, TransactionInput, TransactionStatus, CURRENT_VERSION};
use serde::Serialize;
use tangle_crypto::{blake2b_256, blake2b_256_multi, derive_address, sign_message, verify_signature};
use tangle_types::{Address, Amount, KeyPair, PublicKey, Signature, Timestamp, TransactionId};

#[derive(Serialize)]
struct SigningBody<'a> {
    version: u16,
    transaction_date: u64,
    parents: &'a [TransactionId],
    inputs: Vec<(&'a OutputRef, &'a Address, &'a PublicKey)>,
    outputs: Vec<(&'a Address, Amount)>,
}

/// Digest every input signature commits to.
pub fn signing_hash(tx: &Transaction) -> Result<[u8; 32], TransactionError> {
    let body = SigningBody {
        version: tx.version,
        transaction_date: tx.transaction_date.as_secs(),
        parents: &tx.parents,
        inputs: tx
            .inputs
            .iter()
            .map(|i| (&i.output, &i.address, &i.public_key))
            .collect(),
        outputs: tx.outputs.iter().map(|o| (&o.address, o.amount)).collect(),
    };
    let bytes =
        bincode::serialize(&body).map_err(|e| TransactionError::Serialization(e.to_string()))?;
    Ok(blake2b_256(&bytes))
}

pub fn compute_transaction_id(tx: &Transaction) -> Result<TransactionId, TransactionError> {
    let hash = signing_hash(tx)?;
    let mut parts: Vec<&[u8]> = Vec::with_capacity(1 + tx.inputs.len());
    parts.push(&hash);
    parts.extend(tx.inputs.iter().map(|i| i.signature.as_bytes().as_slice()));
    Ok(TransactionId::new(blake2b_256_multi(&parts)))
}

/// Check that the id matches the content, every claimed address belongs to
/// the input's public key, and every input signature is valid.
pub fn verify_integrity(tx: &Transaction) -> Result<(), TransactionError> {
    let computed = compute_transaction_id(tx)?;
    if computed != tx.id {
        return Err(TransactionError::IdMismatch {
            claimed: tx.id,
            computed,
        });
    }

    let hash = signing_hash(tx)?;
    for (position, input) in tx.inputs.iter().enumerate() {
        let position = position as u32;
        if derive_address(&input.public_key) != input.address {
            return Err(TransactionError::AddressMismatch { id: tx.id, position });
        }
        if !verify_signature(&hash, &input.signature, &input.public_key) {
            return Err(TransactionError::InvalidSignature { id: tx.id, position });
        }
    }
    Ok(())
}

/// Assembles and signs a transaction.
///
/// ```ignore
/// let tx = TransactionBuilder::new(Timestamp::now())
///     .parent(parent_id)
///     .input(OutputRef::new(source_id, 0), &keypair)
///     .output(recipient, Amount::new(10))
///     .build()?;
/// ```
pub struct TransactionBuilder<'a> {
    version: u16,
    transaction_date: Timestamp,
    parents: Vec<TransactionId>,
    inputs: Vec<(OutputRef, &'a KeyPair)>,
    outputs: Vec<TransactionOutput>,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new(transaction_date: Timestamp) -> Self {
        Self {
            version: CURRENT_VERSION,
            transaction_date,
            parents: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn version(mut self, version: u16) -> Self {
        self.version = version;
        self
    }

    pub fn parent(mut self, parent: TransactionId) -> Self {
        self.parents.push(parent);
        self
    }

    /// Spend `output`, signing with `keypair`. The claimed address is derived
    /// from the key pair.
    pub fn input(mut self, output: OutputRef, keypair: &'a KeyPair) -> Self {
        self.inputs.push((output, keypair));
        self
    }

    pub fn output(mut self, address: Address, amount: Amount) -> Self {
        self.outputs.push(TransactionOutput::new(address, amount));
        self
    }

    pub fn build(self) -> Result<Transaction, TransactionError> {
        let mut tx = Transaction {
            id: TransactionId::ZERO,
            version: self.version,
            transaction_date: self.transaction_date,
            parents: self.parents,
            inputs: self
                .inputs
                .iter()
                .map(|(output, kp)| TransactionInput {
                    output: *output,
                    address: derive_address(&kp.public),
                    public_key: kp.public.clone(),
                    signature: Signature::EMPTY,
                })
                .collect(),
            outputs: self.outputs,
            status: TransactionStatus::Pending,
            is_stable: false,
            is_timeout: false,
            is_double_spend: false,
        };

        let hash = signing_hash(&tx)?;
        for (input, (_, kp)) in tx.inputs.iter_mut().zip(self.inputs.iter()) {
            input.signature = sign_message(&hash, &kp.private);
        }
        tx.id = compute_transaction_id(&tx)?;
        Ok(tx)
    }
}
