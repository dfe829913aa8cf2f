use chrono::{DateTime, Duration, Utc};
use engine_core::{EngineError, EngineResult};
use trade_store::Database;

use crate::models::{BrakeCheck, ImpulseTimer, ImpulseTimerRow};

/// Seconds a trader must wait after a GREEN checklist before saving GO
pub const IMPULSE_BRAKE_SECONDS: i64 = 120;

const TIMER_COLUMNS: &str = "id, ticker, started_at, expires_at, active";

#[derive(Clone)]
pub struct ImpulseBrake {
    db: Database,
}

impl ImpulseBrake {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn start(&self, ticker: &str) -> EngineResult<ImpulseTimer> {
        self.start_at(ticker, Utc::now()).await
    }

    /// Replace any running timer for `ticker` with a fresh one.
    pub async fn start_at(&self, ticker: &str, now: DateTime<Utc>) -> EngineResult<ImpulseTimer> {
        if ticker.trim().is_empty() {
            return Err(EngineError::validation("ticker is required"));
        }

        let started_at = now.timestamp();
        let expires_at = (now + Duration::seconds(IMPULSE_BRAKE_SECONDS)).timestamp();

        let mut tx = self.db.begin().await?;
        sqlx::query("UPDATE impulse_timers SET active = 0 WHERE ticker = ? AND active = 1")
            .bind(ticker)
            .execute(&mut *tx)
            .await?;

        let row: ImpulseTimerRow = sqlx::query_as(&format!(
            "INSERT INTO impulse_timers (ticker, started_at, expires_at, active) VALUES (?, ?, ?, 1) RETURNING {TIMER_COLUMNS}"
        ))
        .bind(ticker)
        .bind(started_at)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::debug!("Impulse brake started for {}", ticker);
        Ok(row.into())
    }

    pub async fn active_timer(&self, ticker: &str) -> EngineResult<Option<ImpulseTimer>> {
        let row: Option<ImpulseTimerRow> = sqlx::query_as(&format!(
            "SELECT {TIMER_COLUMNS} FROM impulse_timers WHERE ticker = ? AND active = 1 LIMIT 1"
        ))
        .bind(ticker)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(ImpulseTimer::from))
    }

    pub async fn check(&self, ticker: &str) -> EngineResult<BrakeCheck> {
        self.check_at(ticker, Utc::now()).await
    }

    pub async fn check_at(&self, ticker: &str, now: DateTime<Utc>) -> EngineResult<BrakeCheck> {
        let Some(timer) = self.active_timer(ticker).await? else {
            return Ok(BrakeCheck::NoTimer {
                ticker: ticker.to_string(),
            });
        };

        let remaining = (timer.expires_at - now).num_seconds();
        if remaining > 0 {
            return Ok(BrakeCheck::Engaged {
                ticker: ticker.to_string(),
                seconds_remaining: remaining,
            });
        }
        Ok(BrakeCheck::Released)
    }
}
