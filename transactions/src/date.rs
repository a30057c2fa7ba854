//! Transaction date normalisation.
//!
//! Version 1 transactions stored their date as epoch milliseconds; every later
//! version stores epoch seconds. Comparisons between transactions (the
//! double-spend tie-break, the scheduler's grace period) always go through
//! [`normalize_transaction_date`].

use tangle_types::Timestamp;

/// The version that stored dates in milliseconds.
pub const LEGACY_MILLIS_VERSION: u16 = 1;

/// Version written by [`crate::TransactionBuilder`].
pub const CURRENT_VERSION: u16 = 2;

/// Any raw value above this cannot be a plausible seconds timestamp
/// (it is past the year 5000).
const MILLIS_FLOOR: u64 = 100_000_000_000;

pub fn normalize_transaction_date(version: u16, raw: u64) -> Timestamp {
    if version <= LEGACY_MILLIS_VERSION && raw >= MILLIS_FLOOR {
        Timestamp::from_millis(raw)
    } else {
        Timestamp::new(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_millis_are_scaled() {
        assert_eq!(
            normalize_transaction_date(1, 1_600_000_000_500),
            Timestamp::new(1_600_000_000)
        );
    }

    #[test]
    fn legacy_seconds_left_alone() {
        assert_eq!(
            normalize_transaction_date(1, 1_600_000_000),
            Timestamp::new(1_600_000_000)
        );
    }

    #[test]
    fn current_version_is_seconds() {
        assert_eq!(
            normalize_transaction_date(CURRENT_VERSION, 1_700_000_000),
            Timestamp::new(1_700_000_000)
        );
    }
}
