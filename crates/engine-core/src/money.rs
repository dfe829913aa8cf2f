//! Dollar arithmetic done in `Decimal` so risk and P&L figures are exact for
//! the prices traders actually type in, then handed back as `f64` for storage.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;

fn dec(v: f64) -> Decimal {
    Decimal::from_f64(v).unwrap_or_default()
}

/// `shares * (entry - stop)`: dollars lost if a long position is stopped out.
pub fn risk_dollars(shares: i64, entry: f64, stop: f64) -> f64 {
    (Decimal::from(shares) * (dec(entry) - dec(stop)))
        .to_f64()
        .unwrap_or(0.0)
}

/// `shares * (exit - entry)` for a long position.
pub fn realized_pnl(shares: i64, entry: f64, exit: f64) -> f64 {
    (Decimal::from(shares) * (dec(exit) - dec(entry)))
        .to_f64()
        .unwrap_or(0.0)
}

/// `amount * fraction`, e.g. equity times a heat-cap percentage.
pub fn fraction_of(amount: f64, fraction: f64) -> f64 {
    (dec(amount) * dec(fraction)).to_f64().unwrap_or(0.0)
}

pub fn add(a: f64, b: f64) -> f64 {
    (dec(a) + dec(b)).to_f64().unwrap_or(0.0)
}

pub fn sum<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    values
        .into_iter()
        .map(dec)
        .sum::<Decimal>()
        .to_f64()
        .unwrap_or(0.0)
}
