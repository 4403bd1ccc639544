//! Position sizing: converts a risk budget and a stop-loss distance into a
//! quantity, and a quantity into required margin.

use perp_pilot_core::EngineError;
use rust_decimal::Decimal;

/// Widest stop distance the sizer accepts, as a fraction of entry price.
const MAX_STOP_DISTANCE_PCT: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// Quantity that loses exactly `risk_capital` if the stop is hit.
///
/// `stop_distance_pct` is `|entry - stop| / entry`.
///
/// # Errors
///
/// `InvalidStop` when the distance fraction is zero, negative, or wider
/// than 0.5 (validation rejects those upstream; reaching here with one is
/// a contract breach, not a rejection).
pub fn size_position(
    risk_capital: Decimal,
    entry_price: Decimal,
    stop_distance_pct: Decimal,
) -> Result<Decimal, EngineError> {
    if stop_distance_pct <= Decimal::ZERO || stop_distance_pct > MAX_STOP_DISTANCE_PCT {
        return Err(EngineError::InvalidStop(stop_distance_pct));
    }
    if entry_price <= Decimal::ZERO {
        return Err(EngineError::InvalidStop(stop_distance_pct));
    }
    Ok(risk_capital / (entry_price * stop_distance_pct))
}

/// Margin collateral required to hold `quantity` at `price` under
/// `leverage`. Zero leverage degrades to fully-collateralized.
#[must_use]
pub fn required_margin(quantity: Decimal, price: Decimal, leverage: u8) -> Decimal {
    let notional = quantity * price;
    if leverage == 0 {
        return notional;
    }
    notional / Decimal::from(leverage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn sizes_to_risk_budget() {
        // $16 risk, entry 3000, 2% stop distance -> 16 / 60 tokens.
        let quantity = size_position(dec!(16), dec!(3000), dec!(0.02)).unwrap();
        assert!((quantity - dec!(0.26666666666666666666666667)).abs() < dec!(0.0000001));
    }

    #[test]
    fn zero_distance_is_invalid() {
        let err = size_position(dec!(16), dec!(3000), Decimal::ZERO).unwrap_err();
        assert!(matches!(err, EngineError::InvalidStop(_)));
    }

    #[test]
    fn distance_over_half_is_invalid() {
        assert!(size_position(dec!(16), dec!(3000), dec!(0.51)).is_err());
        assert!(size_position(dec!(16), dec!(3000), dec!(0.5)).is_ok());
    }

    #[test]
    fn negative_distance_is_invalid() {
        assert!(size_position(dec!(16), dec!(3000), dec!(-0.02)).is_err());
    }

    #[test]
    fn margin_scales_down_with_leverage() {
        assert_eq!(required_margin(dec!(0.5), dec!(3000), 5), dec!(300));
        assert_eq!(required_margin(dec!(0.5), dec!(3000), 1), dec!(1500));
        assert_eq!(required_margin(dec!(0.5), dec!(3000), 0), dec!(1500));
    }
}
