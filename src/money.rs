// src/money.rs
//
// Decimal helpers for monetary fields. All pay math runs on rust_decimal so
// sums that cross the netPay/totalAmount invariants never touch binary
// floats.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::warn;

/// Parses a string-or-null monetary field from an upstream record.
///
/// The ingestion pipeline delivers fuel/toll costs as raw strings that are
/// occasionally empty or malformed; those count as zero rather than failing
/// the whole aggregation.
pub fn parse_money(raw: Option<&str>) -> Decimal {
    match raw {
        None => Decimal::ZERO,
        Some(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Decimal::ZERO;
            }
            match trimmed.parse::<Decimal>() {
                Ok(v) => v,
                Err(_) => {
                    warn!("Unparseable monetary value '{}', treating as 0", s);
                    Decimal::ZERO
                }
            }
        }
    }
}

/// Rounds to cents (2 decimal places, banker-free half-up) for values that
/// leave the engine.
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp(2)
}

/// `part / whole * 100`, zero when the denominator is zero.
pub fn percentage(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        Decimal::ZERO
    } else {
        part / whole * dec!(100)
    }
}

/// Safe division, zero when the denominator is zero.
pub fn ratio(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_money_handles_missing_and_garbage() {
        assert_eq!(parse_money(None), Decimal::ZERO);
        assert_eq!(parse_money(Some("")), Decimal::ZERO);
        assert_eq!(parse_money(Some("  ")), Decimal::ZERO);
        assert_eq!(parse_money(Some("not-a-number")), Decimal::ZERO);
        assert_eq!(parse_money(Some("123.45")), dec!(123.45));
        assert_eq!(parse_money(Some(" 7 ")), dec!(7));
    }

    #[test]
    fn percentage_and_ratio_guard_zero_denominators() {
        assert_eq!(percentage(dec!(21), dec!(22)).round_dp(2), dec!(95.45));
        assert_eq!(percentage(dec!(5), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(ratio(dec!(200), dec!(180)).round_dp(2), dec!(1.11));
        assert_eq!(ratio(dec!(1), Decimal::ZERO), Decimal::ZERO);
    }
}
