//! Six-decimal fixed-point helpers.
//!
//! The indexer carries sizes, prices, and USD amounts as integer counts of
//! micro-units (10^-6), serialized as decimal strings. They are parsed once
//! at the API edge and flow through the store and the aggregation pipeline
//! as `i64`; `rust_decimal` enters only at the reporting boundary.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Micro-units per whole unit.
pub const SCALE: i64 = 1_000_000;

/// Parse an indexer numeric string (an integer count of micro-units,
/// occasionally with a stray fractional part) into micro-units.
pub fn parse_micro(s: &str) -> Option<i64> {
    let d = Decimal::from_str(s.trim()).ok()?;
    d.round().to_i64()
}

/// Parse a whole-unit decimal string (e.g. a data-API dollar amount like
/// `"1234.56"`) into micro-units.
pub fn parse_units(s: &str) -> Option<i64> {
    let d = Decimal::from_str(s.trim()).ok()?;
    (d * Decimal::from(SCALE)).round().to_i64()
}

/// Convert whole units to micro-units, rounding to the nearest micro.
pub fn from_f64(units: f64) -> i64 {
    (units * SCALE as f64).round() as i64
}

/// Micro-units as whole units.
pub fn to_f64(micro: i64) -> f64 {
    micro as f64 / SCALE as f64
}

/// Micro-units as an exact decimal, for display.
pub fn to_decimal(micro: i64) -> Decimal {
    Decimal::new(micro, 6)
}

/// USD value of `size` shares at `price`, both in micro-units.
///
/// The product carries twelve fractional digits; one `SCALE` divides back
/// out. Widened through i128 since size * price can exceed i64.
pub fn value_usd(size: i64, price: i64) -> i64 {
    ((size as i128 * price as i128) / SCALE as i128) as i64
}
