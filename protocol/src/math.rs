//! # Fixed-Point Arithmetic
//!
//! All amounts are `u128` integers in the smallest unit of their ledger.
//! Nothing here uses floating point, and nothing wraps: every helper returns
//! `None` on overflow or division by zero so the caller can turn it into a
//! typed error.
//!
//! Division always truncates toward zero. For redemptions this means the
//! vault never pays out more than the exact pro-rata share; the remainder
//! ("dust") stays in the vault.

use primitive_types::U256;

use crate::config::{unit_scale, RATE_SCALE};

/// Computes `a * b / denominator`.
///
/// The product is taken in 256 bits, so only the quotient has to fit in
/// `u128`. Returns `None` if it does not or `denominator` is zero.
pub fn mul_div(a: u128, b: u128, denominator: u128) -> Option<u128> {
    if denominator == 0 {
        return None;
    }
    let quotient = U256::from(a).checked_mul(U256::from(b))? / U256::from(denominator);
    if quotient.bits() > 128 {
        return None;
    }
    Some(quotient.low_u128())
}

/// Settlement units per whole token, scaled by [`RATE_SCALE`]:
/// `deposited * RATE_SCALE / total_supply`.
pub fn redemption_rate(deposited: u128, total_supply: u128) -> Option<u128> {
    mul_div(deposited, RATE_SCALE, total_supply)
}

/// Settlement units owed for `token_amount` at `rate`:
/// `token_amount * rate / RATE_SCALE`.
pub fn redemption_payout(token_amount: u128, rate: u128) -> Option<u128> {
    mul_div(token_amount, rate, RATE_SCALE)
}

/// Renders a raw amount as a decimal string with `decimals` fractional digits,
/// trimming trailing zeros (`1_500_000` at 6 decimals → `"1.5"`).
pub fn format_units(amount: u128, decimals: u8) -> String {
    let Some(scale) = unit_scale(decimals) else {
        return amount.to_string();
    };
    let whole = amount / scale;
    let frac = amount % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0width$}", frac, width = usize::from(decimals));
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: u128 = RATE_SCALE;
    const USDC: u128 = 1_000_000;

    #[test]
    fn mul_div_guards_zero_denominator_and_overflow() {
        assert_eq!(mul_div(10, 10, 0), None);
        assert_eq!(mul_div(u128::MAX, 2, 1), None);
        assert_eq!(mul_div(7, 3, 2), Some(10));
    }

    #[test]
    fn mul_div_only_needs_the_quotient_to_fit() {
        assert_eq!(mul_div(u128::MAX, u128::MAX, u128::MAX), Some(u128::MAX));
        assert_eq!(mul_div(u128::MAX, 3, 4), Some(u128::MAX / 4 * 3 + 2));
        assert_eq!(mul_div(u128::MAX, u128::MAX, 2), None);
    }

    #[test]
    fn eighteen_decimal_settlement_does_not_overflow() {
        // 1,000 DAI over 10M tokens: 0.0001 DAI per token.
        let rate = redemption_rate(1_000 * TOKEN, 10_000_000 * TOKEN).unwrap();
        assert_eq!(rate, 100_000_000_000_000);
        assert_eq!(redemption_payout(5_000 * TOKEN, rate), Some(TOKEN / 2));

        // One DAI per token.
        let rate = redemption_rate(1_000 * TOKEN, 1_000 * TOKEN).unwrap();
        assert_eq!(rate, RATE_SCALE);
        assert_eq!(redemption_payout(500 * TOKEN, rate), Some(500 * TOKEN));
    }

    #[test]
    fn rate_for_ten_million_tokens_and_one_million_usdc() {
        // 1,000,000 USDC over 10,000,000 tokens is 0.1 USDC per token.
        let rate = redemption_rate(1_000_000 * USDC, 10_000_000 * TOKEN).unwrap();
        assert_eq!(rate, 100_000);
        assert_eq!(format_units(rate, 6), "0.1");
    }

    #[test]
    fn payout_is_pro_rata() {
        let rate = redemption_rate(1_000_000 * USDC, 10_000_000 * TOKEN).unwrap();
        let payout = redemption_payout(5_000 * TOKEN, rate).unwrap();
        assert_eq!(payout, 500 * USDC);
    }

    #[test]
    fn tiny_redemption_rounds_to_zero() {
        let rate = redemption_rate(1_000_000 * USDC, 10_000_000 * TOKEN).unwrap();
        // 1e12 token units is 1e-6 of a token, worth 1e-7 USDC: below one unit.
        assert_eq!(redemption_payout(1_000_000_000_000, rate), Some(0));
    }

    #[test]
    fn format_units_trims_and_handles_whole_values() {
        assert_eq!(format_units(1_500_000, 6), "1.5");
        assert_eq!(format_units(2_000_000, 6), "2");
        assert_eq!(format_units(1, 6), "0.000001");
        assert_eq!(format_units(42, 0), "42");
    }
}
