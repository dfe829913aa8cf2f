//! Van Tharp stock sizing: risk a fixed fraction of equity per trade and set
//! the stop a multiple of ATR below entry.
//!
//! ```text
//! equity 10,000 x 0.75% = R 75
//! stop distance 2 x ATR 1.50 = 3.00   initial stop 180 - 3 = 177
//! shares floor(75 / 3) = 25           actual risk 25 x 3 = 75
//! ```

use engine_core::{AccountSettings, EngineError, EngineResult};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSizing {
    /// Risk budget `R = equity * risk_pct`
    pub risk_dollars: f64,
    pub stop_distance: f64,
    pub initial_stop: f64,
    pub shares: i64,
    /// `shares * stop_distance`, never above `risk_dollars`
    pub actual_risk: f64,
}

pub fn size_stock(
    equity: f64,
    risk_pct: f64,
    entry: f64,
    atr: f64,
    stop_multiple: f64,
) -> EngineResult<StockSizing> {
    if equity <= 0.0 || !equity.is_finite() {
        return Err(EngineError::validation(format!(
            "equity must be greater than zero, got {equity:.2}"
        )));
    }
    if risk_pct.is_nan() || risk_pct <= 0.0 || risk_pct > 1.0 {
        return Err(EngineError::validation(format!(
            "risk percent must be between 0 and 1, got {risk_pct:.4}"
        )));
    }
    if entry <= 0.0 || !entry.is_finite() {
        return Err(EngineError::validation(format!(
            "entry price must be positive, got {entry:.2}"
        )));
    }
    if atr <= 0.0 || !atr.is_finite() {
        return Err(EngineError::validation(format!(
            "ATR must be greater than zero, got {atr:.2}"
        )));
    }
    if stop_multiple <= 0.0 || !stop_multiple.is_finite() {
        return Err(EngineError::validation(format!(
            "stop multiple must be positive, got {stop_multiple}"
        )));
    }

    let risk = dec(equity)? * dec(risk_pct)?;
    let stop_distance = dec(stop_multiple)? * dec(atr)?;
    let initial_stop = dec(entry)? - stop_distance;
    let shares = (risk / stop_distance).floor().to_i64().unwrap_or(0);
    let actual_risk = Decimal::from(shares) * stop_distance;

    Ok(StockSizing {
        risk_dollars: to_f64(risk),
        stop_distance: to_f64(stop_distance),
        initial_stop: to_f64(initial_stop),
        shares,
        actual_risk: to_f64(actual_risk),
    })
}

/// `size_stock` with equity, risk fraction and stop multiple from the account.
pub fn size_stock_for(settings: &AccountSettings, entry: f64, atr: f64) -> EngineResult<StockSizing> {
    size_stock(
        settings.equity,
        settings.risk_pct,
        entry,
        atr,
        settings.stop_multiple,
    )
}

fn dec(v: f64) -> EngineResult<Decimal> {
    Decimal::from_f64(v).ok_or_else(|| EngineError::validation(format!("{v} is not a usable amount")))
}

fn to_f64(v: Decimal) -> f64 {
    v.to_f64().unwrap_or(0.0)
}
