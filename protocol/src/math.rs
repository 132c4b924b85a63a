//! # Fixed-point Arithmetic
//!
//! Every share/amount conversion in Ballast funnels through this module so
//! that exactly one rounding rule exists: **toward zero**. If you find a
//! division by `PRECISION` anywhere else in the codebase, move it here.
//!
//! ## Why a 256-bit intermediate?
//!
//! Amounts are 18-decimal `u128`s and so is NAV. `shares × nav` for a
//! supply of a few hundred tokens already exceeds `u128::MAX`, so
//! [`mul_div_down`] computes the full 256-bit product (a `ruint` `U256`)
//! before dividing. The
//! quotient must still fit in a `u128`, otherwise we report
//! [`MathError::Overflow`] instead of silently wrapping.

use ruint::aliases::U256;
use thiserror::Error;

use crate::config::{BPS_DENOMINATOR, MAX_COLLATERAL_DECIMALS, PRECISION, STABLE_DECIMALS};

/// Errors from fixed-point arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MathError {
    /// The result does not fit in a `u128`.
    #[error("arithmetic overflow")]
    Overflow,

    /// Division by zero (e.g. a zero NAV).
    #[error("division by zero")]
    DivisionByZero,

    /// A collateral kind declared more decimals than a `u128` can scale.
    #[error("unsupported decimals: {0}")]
    UnsupportedDecimals(u8),
}

/// Computes `floor(a × b / denominator)` without intermediate overflow.
///
/// # Errors
///
/// [`MathError::DivisionByZero`] if `denominator == 0`,
/// [`MathError::Overflow`] if the quotient exceeds `u128::MAX`.
///
/// # Example
///
/// ```
/// use ballast_protocol::math::mul_div_down;
///
/// assert_eq!(mul_div_down(7, 3, 2).unwrap(), 10);
/// // 2^127 * 4 / 8 overflows a u128 in the middle, not at the end.
/// assert_eq!(mul_div_down(1 << 127, 4, 8).unwrap(), 1 << 126);
/// ```
pub fn mul_div_down(a: u128, b: u128, denominator: u128) -> Result<u128, MathError> {
    if denominator == 0 {
        return Err(MathError::DivisionByZero);
    }
    if let Some(product) = a.checked_mul(b) {
        return Ok(product / denominator);
    }

    // Two 128-bit factors always fit in 256 bits.
    let product = U256::from(a) * U256::from(b);
    let quotient = product / U256::from(denominator);
    u128::try_from(quotient).map_err(|_| MathError::Overflow)
}

/// `amount × bps / 10_000`, rounded toward zero.
pub fn bps_of(amount: u128, bps: u32) -> Result<u128, MathError> {
    mul_div_down(amount, u128::from(bps), BPS_DENOMINATOR)
}

/// `10^decimals` as a `u128`.
pub fn pow10(decimals: u8) -> Result<u128, MathError> {
    if decimals > MAX_COLLATERAL_DECIMALS {
        return Err(MathError::UnsupportedDecimals(decimals));
    }
    10u128
        .checked_pow(u32::from(decimals))
        .ok_or(MathError::Overflow)
}

/// Scales a native-precision collateral amount to the 18-decimal stable
/// precision. Truncates when the collateral has more than 18 decimals.
pub fn normalize(amount: u128, decimals: u8) -> Result<u128, MathError> {
    if decimals == STABLE_DECIMALS {
        return Ok(amount);
    }
    if decimals < STABLE_DECIMALS {
        let factor = pow10(STABLE_DECIMALS - decimals)?;
        amount.checked_mul(factor).ok_or(MathError::Overflow)
    } else {
        Ok(amount / pow10(decimals - STABLE_DECIMALS)?)
    }
}

/// Inverse of [`normalize`]: stable precision → native collateral
/// precision, truncating toward zero.
pub fn denormalize(amount: u128, decimals: u8) -> Result<u128, MathError> {
    if decimals == STABLE_DECIMALS {
        return Ok(amount);
    }
    if decimals < STABLE_DECIMALS {
        Ok(amount / pow10(STABLE_DECIMALS - decimals)?)
    } else {
        let factor = pow10(decimals - STABLE_DECIMALS)?;
        amount.checked_mul(factor).ok_or(MathError::Overflow)
    }
}

/// Shares represented by `amount` at `nav_per_share`.
pub fn shares_for_amount(amount: u128, nav_per_share: u128) -> Result<u128, MathError> {
    mul_div_down(amount, PRECISION, nav_per_share)
}

/// Amount represented by `shares` at `nav_per_share`.
pub fn amount_for_shares(shares: u128, nav_per_share: u128) -> Result<u128, MathError> {
    mul_div_down(shares, nav_per_share, PRECISION)
}

/// NAV per share implied by a report. An empty ledger is priced at par.
pub fn nav_from_assets(total_assets: u128, total_shares: u128) -> Result<u128, MathError> {
    if total_shares == 0 {
        return Ok(PRECISION);
    }
    mul_div_down(total_assets, PRECISION, total_shares)
}

/// `numerator × 10_000 / denominator`, e.g. a collateral ratio in bps.
pub fn ratio_bps(numerator: u128, denominator: u128) -> Result<u128, MathError> {
    mul_div_down(numerator, BPS_DENOMINATOR, denominator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn mul_div_small_values() {
        assert_eq!(mul_div_down(10, 10, 3).unwrap(), 33);
        assert_eq!(mul_div_down(0, 123, 7).unwrap(), 0);
    }

    #[test]
    fn mul_div_rejects_zero_denominator() {
        assert_eq!(mul_div_down(1, 1, 0), Err(MathError::DivisionByZero));
    }

    #[test]
    fn mul_div_wide_intermediate() {
        // 10^30 shares at NAV 1.5; the product is ~1.5e48, far past u128.
        let shares = 10u128.pow(30);
        let nav = PRECISION + PRECISION / 2;
        assert_eq!(
            mul_div_down(shares, nav, PRECISION).unwrap(),
            15 * 10u128.pow(29)
        );
    }

    #[test]
    fn mul_div_reports_quotient_overflow() {
        assert_eq!(mul_div_down(u128::MAX, u128::MAX, 1), Err(MathError::Overflow));
    }

    #[test]
    fn mul_div_max_times_max_over_max() {
        assert_eq!(mul_div_down(u128::MAX, u128::MAX, u128::MAX).unwrap(), u128::MAX);
    }

    #[test]
    fn bps_rounds_toward_zero() {
        // 10 bps of 999 = 0.999 -> 0
        assert_eq!(bps_of(999, 10).unwrap(), 0);
        assert_eq!(bps_of(500 * PRECISION, 10).unwrap(), PRECISION / 2);
    }

    #[test]
    fn normalize_six_decimals() {
        assert_eq!(normalize(1_000_000, 6).unwrap(), PRECISION);
        assert_eq!(denormalize(PRECISION, 6).unwrap(), 1_000_000);
    }

    #[test]
    fn denormalize_truncates_dust() {
        // 0.4995 units at 6 decimals loses everything past the 6th place.
        assert_eq!(denormalize(499_500_000_000_000_001, 6).unwrap(), 499_500);
    }

    #[test]
    fn normalize_high_precision_collateral_truncates() {
        assert_eq!(normalize(10u128.pow(24) + 999, 24).unwrap(), PRECISION);
        assert_eq!(denormalize(PRECISION, 24).unwrap(), 10u128.pow(24));
    }

    #[test]
    fn unsupported_decimals_rejected() {
        assert_eq!(pow10(39), Err(MathError::UnsupportedDecimals(39)));
    }

    #[test]
    fn empty_ledger_is_priced_at_par() {
        assert_eq!(nav_from_assets(12345, 0).unwrap(), PRECISION);
        assert_eq!(nav_from_assets(2 * PRECISION, PRECISION).unwrap(), 2 * PRECISION);
    }

    #[test]
    fn ratio_in_bps() {
        assert_eq!(ratio_bps(9_400, 10_000).unwrap(), 9_400);
    }

    proptest! {
        #[test]
        fn mul_div_matches_narrow_path(a in 0u128..(1 << 63), b in 0u128..(1 << 63), d in 1u128..u128::MAX) {
            prop_assert_eq!(mul_div_down(a, b, d).unwrap(), a * b / d);
        }

        #[test]
        fn wide_path_is_consistent_with_split(a in any::<u64>(), d in 1u64..u64::MAX) {
            // (a * 2^64) * 2^64 / (d * 2^64) == a * 2^64 / d
            let a = u128::from(a);
            let d = u128::from(d);
            let lhs = mul_div_down(a << 64, 1 << 64, d << 64).unwrap();
            prop_assert_eq!(lhs, (a << 64) / d);
        }

        #[test]
        fn wide_path_matches_exact_quotient(a in any::<u128>(), b in any::<u128>(), d in 1u128..=u128::MAX) {
            let exact = U256::from(a) * U256::from(b) / U256::from(d);
            match mul_div_down(a, b, d) {
                Ok(q) => prop_assert_eq!(U256::from(q), exact),
                Err(e) => {
                    prop_assert_eq!(e, MathError::Overflow);
                    prop_assert!(exact > U256::from(u128::MAX));
                }
            }
        }

        #[test]
        fn round_trip_never_inflates(amount in 0u128..10u128.pow(30), nav in PRECISION / 2..PRECISION * 4) {
            let shares = shares_for_amount(amount, nav).unwrap();
            let back = amount_for_shares(shares, nav).unwrap();
            prop_assert!(back <= amount);
        }
    }
}
