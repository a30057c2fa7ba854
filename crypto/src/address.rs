//! Address derivation from public keys.
//!
//! Format: `tgl_` + hex(public_key, 64 chars) + hex(checksum, 8 chars), where
//! the checksum is the first 4 bytes of Blake2b-256(public_key).

use crate::hash::blake2b_256;
use tangle_types::{Address, PublicKey};

const CHECKSUM_LEN: usize = 4;
const ENCODED_LEN: usize = 2 * (32 + CHECKSUM_LEN);

pub fn derive_address(public_key: &PublicKey) -> Address {
    let checksum = &blake2b_256(public_key.as_bytes())[..CHECKSUM_LEN];
    Address::new(format!(
        "{}{}{}",
        Address::PREFIX,
        hex::encode(public_key.as_bytes()),
        hex::encode(checksum)
    ))
}

/// Recover the public key from an address, verifying the checksum.
pub fn decode_address(address: &Address) -> Option<PublicKey> {
    let body = address.as_str().strip_prefix(Address::PREFIX)?;
    if body.len() != ENCODED_LEN {
        return None;
    }
    let bytes = hex::decode(body).ok()?;
    let key: [u8; 32] = bytes[..32].try_into().ok()?;
    let expected = &blake2b_256(&key)[..CHECKSUM_LEN];
    if &bytes[32..] != expected {
        return None;
    }
    Some(PublicKey(key))
}

pub fn validate_address(address: &Address) -> bool {
    decode_address(address).is_some()
}
