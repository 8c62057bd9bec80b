//! Validation rule functions (§4.I), applied at the RPC boundary (by
//! `PortfolioService::AddTransaction`) and by the Meroshare/TMS
//! ingesters. Each rule is a small pure function rather than one big
//! `validate_transaction` god-function, so a caller can run a subset of
//! checks (the CSV ingesters skip trading-hours and price-band, which
//! only apply to interactive entry) without threading flags through one
//! monolith.

use super::types::{LotSizeCategory, ValidationOutcome};
use crate::clock::MarketClock;
use crate::error::ValidationError;
use chrono::{DateTime, Timelike};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

static SYMBOL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{3,6}$").expect("constant pattern"));

/// `^[A-Z]{3,6}$`. Callers upper-case the input first per spec §4.H
/// ("All symbol inputs are upper-cased and validated").
pub fn validate_symbol(symbol: &str) -> ValidationOutcome {
    if SYMBOL_PATTERN.is_match(symbol) {
        ValidationOutcome::Ok
    } else {
        ValidationError::InvalidSymbol(format!("{symbol:?} is not 3-6 uppercase letters")).into()
    }
}

/// Positive and a multiple of the symbol category's lot size. In lenient
/// mode a non-multiple is downgraded to a `Warning` carrying the nearest
/// smaller valid quantity, per spec §4.I / §8 scenario 6.
pub fn validate_quantity(quantity: i64, category: LotSizeCategory, strict: bool) -> ValidationOutcome {
    if quantity <= 0 {
        return ValidationError::InvalidQuantity(format!("quantity {quantity} must be positive")).into();
    }
    let lot_size = category.lot_size();
    if quantity % lot_size == 0 {
        return ValidationOutcome::Ok;
    }
    let suggested = (quantity / lot_size) * lot_size;
    let message = format!("quantity {quantity} is not a multiple of the lot size {lot_size}");
    if strict {
        ValidationError::InvalidQuantity(message).into()
    } else {
        ValidationOutcome::Warning {
            message,
            suggested_quantity: Some(suggested.max(lot_size)),
        }
    }
}

pub fn validate_unit_price(unit_price_paisa: i64) -> ValidationOutcome {
    if unit_price_paisa > 0 {
        ValidationOutcome::Ok
    } else {
        ValidationError::InvalidUnitPrice(format!("unit price {unit_price_paisa} must be strictly positive")).into()
    }
}

/// `|price - last_close| <= 10% * last_close`, skipped when there is no
/// last close to compare against (a freshly listed symbol, say).
pub fn validate_price_band(unit_price_paisa: i64, last_close_paisa: Option<i64>) -> ValidationOutcome {
    let Some(last_close) = last_close_paisa else {
        return ValidationOutcome::Ok;
    };
    if last_close <= 0 {
        return ValidationOutcome::Ok;
    }
    let deviation = (unit_price_paisa - last_close).unsigned_abs() as f64 / last_close as f64;
    if deviation <= 0.10 {
        ValidationOutcome::Ok
    } else {
        ValidationError::PriceBand(format!(
            "price {unit_price_paisa} deviates {:.1}% from last close {last_close}, exceeding the 10% band",
            deviation * 100.0
        ))
        .into()
    }
}

/// `date` is a trading day and `entry_time`'s hour falls in `[open, close)`.
pub fn validate_trading_hours(clock: &MarketClock, entry_time: DateTime<Tz>) -> ValidationOutcome {
    if clock.is_open(entry_time) {
        ValidationOutcome::Ok
    } else {
        ValidationError::TradingHours(format!(
            "{} is outside trading hours [{}, {})",
            entry_time.format("%Y-%m-%d %H:%M %Z"),
            clock.open_hour,
            clock.close_hour
        ))
        .into()
    }
}

const MINIMUM_TRANSACTION_VALUE_PAISA: i64 = 500 * 100;

/// `qty * price >= Rs 500` (spec §4.I).
pub fn validate_minimum_value(quantity: i64, unit_price_paisa: i64) -> ValidationOutcome {
    let value = quantity.saturating_mul(unit_price_paisa);
    if value >= MINIMUM_TRANSACTION_VALUE_PAISA {
        ValidationOutcome::Ok
    } else {
        ValidationError::MinimumValue(format!(
            "transaction value {value} paisa is below the Rs 500 minimum"
        ))
        .into()
    }
}

/// Maps a sector to its lot-size category (spec §4.I: "bank symbols: 10;
/// insurance: 100; default: 10").
pub fn lot_size_category(sector: crate::domain::Sector) -> LotSizeCategory {
    use crate::domain::Sector;
    match sector {
        Sector::CommercialBank | Sector::DevelopmentBank | Sector::Finance => LotSizeCategory::Bank,
        Sector::LifeInsurance | Sector::NonLifeInsurance => LotSizeCategory::Insurance,
        _ => LotSizeCategory::Default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn symbol_rejects_lowercase_and_wrong_length() {
        assert!(validate_symbol("NABIL").is_ok());
        assert!(validate_symbol("nabil").is_error());
        assert!(validate_symbol("AB").is_error());
        assert!(validate_symbol("TOOLONG1").is_error());
    }

    #[test]
    fn bank_lot_size_15_is_rejected_strict_and_warned_lenient() {
        let strict = validate_quantity(15, LotSizeCategory::Bank, true);
        assert!(strict.is_error());

        let lenient = validate_quantity(15, LotSizeCategory::Bank, false);
        match lenient {
            ValidationOutcome::Warning { suggested_quantity, .. } => assert_eq!(suggested_quantity, Some(10)),
            other => panic!("expected a warning, got {other:?}"),
        }
    }

    #[test]
    fn price_band_accepts_within_10_percent() {
        assert!(validate_price_band(550, Some(500)).is_ok());
        assert!(validate_price_band(560, Some(500)).is_error());
        assert!(validate_price_band(999, None).is_ok());
    }

    #[test]
    fn minimum_value_rejects_small_trades() {
        assert!(validate_minimum_value(1, 100 * 100).is_error());
        assert!(validate_minimum_value(10, 100 * 100).is_ok());
    }

    #[test]
    fn trading_hours_use_the_market_clock() {
        let clock = MarketClock::new(11, 15, Default::default());
        let during = crate::clock::NPT.with_ymd_and_hms(2024, 6, 16, 12, 0, 0).unwrap();
        let after = crate::clock::NPT.with_ymd_and_hms(2024, 6, 16, 16, 0, 0).unwrap();
        assert!(validate_trading_hours(&clock, during).is_ok());
        assert!(validate_trading_hours(&clock, after).is_error());
    }
}
