//! Ledger address type with `tgl_` prefix.

use crate::error::TypeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An address that owns transaction outputs, always prefixed with `tgl_`.
///
/// Derived from the owner's public key (see `tangle_crypto::derive_address`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// The standard prefix for every address.
    pub const PREFIX: &'static str = "tgl_";

    /// Create an address from a raw string.
    ///
    /// # Panics
    /// Panics if the string does not start with `tgl_`.
    pub fn new(raw: impl Into<String>) -> Self {
        let s = raw.into();
        assert!(s.starts_with(Self::PREFIX), "address must start with tgl_");
        Self(s)
    }

    /// Fallible constructor for untrusted input.
    pub fn parse(raw: impl Into<String>) -> Result<Self, TypeError> {
        let s = raw.into();
        if s.starts_with(Self::PREFIX) && s.len() > Self::PREFIX.len() {
            Ok(Self(s))
        } else {
            Err(TypeError::InvalidAddress(s))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
