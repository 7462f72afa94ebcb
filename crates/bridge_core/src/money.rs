//! Decimal formatting at the wire boundary.

use rust_decimal::{Decimal, RoundingStrategy};

/// Unit price text: trailing zeros trimmed but at least one fractional
/// digit (`10.00` -> `"10.0"`, `8.50` -> `"8.5"`).
pub fn format_price(value: Decimal) -> String {
    let mut value = value.normalize();
    if value.scale() == 0 {
        value.rescale(1);
    }
    value.to_string()
}

/// Round a total to two decimals (half away from zero).
pub fn round_total(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Total text: rounded to two decimals, then formatted like a price.
pub fn format_total(value: Decimal) -> String {
    format_price(round_total(value))
}

/// `unit × quantity`, rounded for display. `None` on overflow.
pub fn line_total(unit: Decimal, quantity: Decimal) -> Option<Decimal> {
    unit.checked_mul(quantity).map(round_total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(dec("10.00")), "10.0");
        assert_eq!(format_price(dec("8.50")), "8.5");
        assert_eq!(format_price(dec("12.345")), "12.345");
        assert_eq!(format_price(Decimal::ZERO), "0.0");
    }

    #[test]
    fn test_format_total() {
        assert_eq!(format_total(dec("255")), "255.0");
        assert_eq!(format_total(dec("102.345")), "102.35");
        assert_eq!(format_total(dec("0.005")), "0.01");
    }

    #[test]
    fn test_line_total_has_no_float_drift() {
        // 0.1 * 3 is 0.30000000000000004 in binary floating point.
        assert_eq!(line_total(dec("0.1"), dec("3")), Some(dec("0.30")));
        assert_eq!(line_total(dec("10.0"), dec("25.5")), Some(dec("255.00")));
        assert_eq!(line_total(Decimal::MAX, dec("2")), None);
    }
}
