use chrono::{DateTime, Utc};
use engine_core::{EngineError, Outcome, PositionStatus};
use serde::{Deserialize, Serialize};

/// A long position opened from a GO decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: i64,
    pub ticker: String,
    pub entry_price: f64,
    pub initial_stop: f64,
    pub current_stop: f64,
    pub shares: i64,
    /// `shares * (entry_price - current_stop)`
    pub risk_dollars: f64,
    pub bucket: String,
    pub status: PositionStatus,
    pub exit_price: Option<f64>,
    pub exit_date: Option<String>,
    pub outcome: Option<Outcome>,
    pub pnl: Option<f64>,
    pub decision_id: Option<i64>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }
}

pub(crate) const POSITION_COLUMNS: &str = r#"
    id, ticker, entry_price, initial_stop, current_stop, shares, risk_dollars,
    bucket, status, exit_price, exit_date, outcome, pnl, decision_id,
    opened_at, closed_at
"#;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PositionRow {
    pub id: i64,
    pub ticker: String,
    pub entry_price: f64,
    pub initial_stop: f64,
    pub current_stop: f64,
    pub shares: i64,
    pub risk_dollars: f64,
    pub bucket: String,
    pub status: String,
    pub exit_price: Option<f64>,
    pub exit_date: Option<String>,
    pub outcome: Option<String>,
    pub pnl: Option<f64>,
    pub decision_id: Option<i64>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl TryFrom<PositionRow> for Position {
    type Error = EngineError;

    fn try_from(row: PositionRow) -> Result<Self, Self::Error> {
        Ok(Position {
            id: row.id,
            ticker: row.ticker,
            entry_price: row.entry_price,
            initial_stop: row.initial_stop,
            current_stop: row.current_stop,
            shares: row.shares,
            risk_dollars: row.risk_dollars,
            bucket: row.bucket,
            status: row.status.parse()?,
            exit_price: row.exit_price,
            exit_date: row.exit_date,
            outcome: row.outcome.map(|o| o.parse()).transpose()?,
            pnl: row.pnl,
            decision_id: row.decision_id,
            opened_at: row.opened_at,
            closed_at: row.closed_at,
        })
    }
}
