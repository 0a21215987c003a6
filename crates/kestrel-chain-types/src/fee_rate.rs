//! Fee rate arithmetic.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Fee per 1000 bytes of transaction size.
///
/// Stored as an integer to keep config and wire representations exact;
/// ranking comparisons between raw (fee, size) pairs go through
/// [`cmp_feerate`] instead of dividing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct FeeRate {
    sat_per_kb: u64,
}

impl FeeRate {
    /// A zero rate.
    pub const ZERO: FeeRate = FeeRate { sat_per_kb: 0 };

    /// Build from satoshis per 1000 bytes.
    pub const fn from_sat_per_kb(sat_per_kb: u64) -> Self {
        Self { sat_per_kb }
    }

    /// Rate implied by paying `fee` for `size` bytes, rounded down.
    pub fn from_fee_size(fee: u64, size: u64) -> Self {
        if size == 0 {
            return Self::ZERO;
        }
        Self {
            sat_per_kb: ((fee as u128 * 1000) / size as u128) as u64,
        }
    }

    /// Satoshis per 1000 bytes.
    pub const fn sat_per_kb(&self) -> u64 {
        self.sat_per_kb
    }

    /// Fee required for a transaction of `size` bytes, rounded up so a
    /// transaction paying exactly the returned fee meets this rate.
    pub fn fee_for(&self, size: u64) -> u64 {
        let fee = (self.sat_per_kb as u128 * size as u128).div_ceil(1000);
        fee as u64
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sat/kB", self.sat_per_kb)
    }
}

/// Compare fee/size ratios by cross-multiplication.
///
/// `a_fee/a_size` vs `b_fee/b_size` without division, so equal ratios
/// compare equal regardless of magnitude. Fees are signed because
/// priority deltas can push a modified fee negative.
pub fn cmp_feerate(a_fee: i64, a_size: u64, b_fee: i64, b_size: u64) -> Ordering {
    let lhs = a_fee as i128 * b_size as i128;
    let rhs = b_fee as i128 * a_size as i128;
    lhs.cmp(&rhs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_for_rounds_up() {
        let rate = FeeRate::from_sat_per_kb(1000);
        assert_eq!(rate.fee_for(250), 250);
        assert_eq!(rate.fee_for(1), 1);
        let rate = FeeRate::from_sat_per_kb(999);
        assert_eq!(rate.fee_for(1000), 999);
        assert_eq!(rate.fee_for(1001), 1000);
    }

    #[test]
    fn test_from_fee_size() {
        assert_eq!(FeeRate::from_fee_size(1000, 250).sat_per_kb(), 4000);
        assert_eq!(FeeRate::from_fee_size(1, 0), FeeRate::ZERO);
    }

    #[test]
    fn test_cmp_feerate_exact_equality() {
        // 1000/250 == 2000/500 even though both divisions truncate the
        // same way only by luck.
        assert_eq!(cmp_feerate(1000, 250, 2000, 500), Ordering::Equal);
        assert_eq!(cmp_feerate(3000, 500, 1250, 250), Ordering::Greater);
        assert_eq!(cmp_feerate(1, 3, 1, 2), Ordering::Less);
    }

    #[test]
    fn test_cmp_feerate_negative_fee() {
        assert_eq!(cmp_feerate(-10, 100, 1, 100), Ordering::Less);
    }

    #[test]
    fn test_cmp_feerate_no_overflow() {
        assert_eq!(
            cmp_feerate(i64::MAX, u64::MAX, i64::MAX, u64::MAX),
            Ordering::Equal
        );
    }
}
