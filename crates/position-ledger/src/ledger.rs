use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use engine_core::{
    money, trading_day, DecisionAction, EngineError, EngineResult, HeatSource, Outcome,
    PositionStatus,
};
use risk_manager::CooldownManager;
use sqlx::SqliteConnection;
use trade_store::{CandidateStore, Database, DecisionStore};

use crate::models::{Position, PositionRow, POSITION_COLUMNS};

/// Open and closed positions, and the heat they carry
#[derive(Clone)]
pub struct PositionLedger {
    db: Database,
}

impl PositionLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open a position from today's GO decision for `ticker`.
    pub async fn open(&self, ticker: &str) -> EngineResult<Position> {
        let mut tx = self.db.begin().await?;
        let position = Self::open_in(&mut tx, ticker).await?;
        tx.commit().await?;
        Ok(position)
    }

    /// `open` on a caller-supplied connection. Nothing is committed here.
    pub async fn open_in(conn: &mut SqliteConnection, ticker: &str) -> EngineResult<Position> {
        let ticker = ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(EngineError::validation("ticker is required"));
        }
        let today = trading_day();

        let decision = DecisionStore::find_for_date(&mut *conn, &ticker, &today)
            .await?
            .ok_or_else(|| {
                EngineError::not_found(format!("no decision found for {ticker} on {today}"))
            })?;
        if decision.action != DecisionAction::Go {
            return Err(EngineError::validation(format!(
                "cannot open {ticker}: decision is {}, not GO",
                decision.action
            )));
        }

        // Unscreened tickers carry no bucket and never trigger cooldowns.
        let bucket = CandidateStore::find_bucket(&mut *conn, &today, &ticker)
            .await?
            .unwrap_or_default();

        let row: PositionRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO positions (
                ticker, entry_price, initial_stop, current_stop, shares,
                risk_dollars, bucket, status, decision_id, opened_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 'OPEN', ?, ?)
            RETURNING {POSITION_COLUMNS}
            "#
        ))
        .bind(&ticker)
        .bind(decision.entry)
        .bind(decision.initial_stop)
        .bind(decision.initial_stop)
        .bind(decision.shares)
        .bind(decision.risk_dollars)
        .bind(&bucket)
        .bind(decision.id)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| match EngineError::from(e) {
            EngineError::Conflict(_) => {
                EngineError::conflict(format!("position already open for {ticker}"))
            }
            other => other,
        })?;

        let position = Position::try_from(row)?;
        tracing::info!(
            "Opened {} x{} @ {:.2} stop {:.2} risk ${:.2} bucket {:?}",
            position.ticker,
            position.shares,
            position.entry_price,
            position.current_stop,
            position.risk_dollars,
            position.bucket
        );
        Ok(position)
    }

    /// Raise the stop on an open position. Stops never move down.
    pub async fn update_stop(&self, ticker: &str, new_stop: f64) -> EngineResult<Position> {
        if !new_stop.is_finite() || new_stop < 0.0 {
            return Err(EngineError::validation(format!(
                "stop must be a non-negative price, got {new_stop}"
            )));
        }

        let mut tx = self.db.begin().await?;
        let current = Self::find_open(&mut tx, ticker)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("no open position for {ticker}")))?;

        if new_stop < current.current_stop {
            return Err(EngineError::validation(format!(
                "new stop {:.2} is below current stop {:.2} for {}",
                new_stop, current.current_stop, ticker
            )));
        }

        let risk = money::risk_dollars(current.shares, current.entry_price, new_stop);
        let row: PositionRow = sqlx::query_as(&format!(
            r#"
            UPDATE positions SET current_stop = ?, risk_dollars = ?
            WHERE id = ? AND status = 'OPEN'
            RETURNING {POSITION_COLUMNS}
            "#
        ))
        .bind(new_stop)
        .bind(risk)
        .bind(current.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Stop for {} moved {:.2} -> {:.2}, risk ${:.2}",
            ticker,
            current.current_stop,
            new_stop,
            risk
        );
        Position::try_from(row)
    }

    pub async fn close(
        &self,
        ticker: &str,
        exit_price: f64,
        outcome: Outcome,
    ) -> EngineResult<Position> {
        self.close_at(ticker, exit_price, outcome, Utc::now()).await
    }

    /// Close the open position. A LOSS in a named bucket starts that bucket's
    /// cooldown in the same transaction.
    pub async fn close_at(
        &self,
        ticker: &str,
        exit_price: f64,
        outcome: Outcome,
        now: DateTime<Utc>,
    ) -> EngineResult<Position> {
        // Zero is a real exit: the stock went to nothing or the option expired worthless.
        if !exit_price.is_finite() || exit_price < 0.0 {
            return Err(EngineError::validation(format!(
                "exit price must be non-negative, got {exit_price}"
            )));
        }

        let mut tx = self.db.begin().await?;
        let open = Self::find_open(&mut tx, ticker)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("no open position for {ticker}")))?;

        let pnl = money::realized_pnl(open.shares, open.entry_price, exit_price);
        let exit_date = now.with_timezone(&Local).format("%Y-%m-%d").to_string();

        let row: PositionRow = sqlx::query_as(&format!(
            r#"
            UPDATE positions SET
                status = 'CLOSED', exit_price = ?, exit_date = ?,
                outcome = ?, pnl = ?, closed_at = ?
            WHERE id = ? AND status = 'OPEN'
            RETURNING {POSITION_COLUMNS}
            "#
        ))
        .bind(exit_price)
        .bind(&exit_date)
        .bind(outcome.as_str())
        .bind(pnl)
        .bind(now)
        .bind(open.id)
        .fetch_one(&mut *tx)
        .await?;

        if outcome == Outcome::Loss && !open.bucket.is_empty() {
            let reason = format!("Loss on {}", open.ticker);
            CooldownManager::trigger_in(&mut tx, &open.bucket, &reason, now).await?;
        }

        tx.commit().await?;

        tracing::info!(
            "Closed {} @ {:.2}: {} pnl ${:.2}",
            open.ticker,
            exit_price,
            outcome,
            pnl
        );
        Position::try_from(row)
    }

    pub async fn get(&self, id: i64) -> EngineResult<Position> {
        let row: Option<PositionRow> =
            sqlx::query_as(&format!("SELECT {POSITION_COLUMNS} FROM positions WHERE id = ?"))
                .bind(id)
                .fetch_optional(self.db.pool())
                .await?;

        row.ok_or_else(|| EngineError::not_found(format!("position {id} not found")))?
            .try_into()
    }

    pub async fn open_position(&self, ticker: &str) -> EngineResult<Option<Position>> {
        let mut conn = self.db.pool().acquire().await?;
        Self::find_open(&mut conn, ticker).await
    }

    /// Positions newest first, optionally filtered by status.
    pub async fn all_positions(
        &self,
        status: Option<PositionStatus>,
    ) -> EngineResult<Vec<Position>> {
        let rows: Vec<PositionRow> = match status {
            Some(status) => {
                sqlx::query_as(&format!(
                    "SELECT {POSITION_COLUMNS} FROM positions WHERE status = ? ORDER BY opened_at DESC, id DESC"
                ))
                .bind(status.as_str())
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {POSITION_COLUMNS} FROM positions ORDER BY opened_at DESC, id DESC"
                ))
                .fetch_all(self.db.pool())
                .await?
            }
        };

        rows.into_iter().map(Position::try_from).collect()
    }

    pub async fn open_positions(&self) -> EngineResult<Vec<Position>> {
        self.all_positions(Some(PositionStatus::Open)).await
    }

    /// Total dollars at risk across open positions.
    pub async fn aggregate_heat(&self) -> EngineResult<f64> {
        let risks: Vec<(f64,)> =
            sqlx::query_as("SELECT risk_dollars FROM positions WHERE status = 'OPEN'")
                .fetch_all(self.db.pool())
                .await?;
        Ok(money::sum(risks.into_iter().map(|(r,)| r)))
    }

    pub async fn bucket_heat(&self, bucket: &str) -> EngineResult<f64> {
        if bucket.is_empty() {
            return Ok(0.0);
        }
        let risks: Vec<(f64,)> = sqlx::query_as(
            "SELECT risk_dollars FROM positions WHERE status = 'OPEN' AND bucket = ?",
        )
        .bind(bucket)
        .fetch_all(self.db.pool())
        .await?;
        Ok(money::sum(risks.into_iter().map(|(r,)| r)))
    }

    async fn find_open(conn: &mut SqliteConnection, ticker: &str) -> EngineResult<Option<Position>> {
        let row: Option<PositionRow> = sqlx::query_as(&format!(
            "SELECT {POSITION_COLUMNS} FROM positions WHERE ticker = ? AND status = 'OPEN' LIMIT 1"
        ))
        .bind(ticker.trim().to_uppercase())
        .fetch_optional(&mut *conn)
        .await?;

        row.map(Position::try_from).transpose()
    }
}

#[async_trait]
impl HeatSource for PositionLedger {
    async fn portfolio_heat(&self) -> EngineResult<f64> {
        self.aggregate_heat().await
    }

    async fn bucket_heat(&self, bucket: &str) -> EngineResult<f64> {
        PositionLedger::bucket_heat(self, bucket).await
    }
}
