//! Cryptographic primitives for the tangle ledger.
//!
//! - **Ed25519** for input signatures
//! - **Blake2b** for transaction ids and address checksums
//! - Address derivation with `tgl_` prefix and hex encoding

pub mod address;
pub mod hash;
pub mod keys;
pub mod sign;

pub use address::{decode_address, derive_address, validate_address};
pub use hash::{blake2b_256, blake2b_256_multi};
pub use keys::{generate_keypair, keypair_from_seed, public_from_private};
pub use sign::{sign_message, verify_signature};
