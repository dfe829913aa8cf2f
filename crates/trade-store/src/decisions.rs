use chrono::{DateTime, Utc};
use engine_core::{trading_day, Banner, Decision, EngineError, EngineResult, NewDecision};
use sqlx::SqliteConnection;

use crate::db::Database;

const DECISION_COLUMNS: &str = r#"
    id, date, ticker, action, entry, atr, stop_distance,
    initial_stop, shares, contracts, risk_dollars, banner,
    method, delta, max_loss, bucket, reason, corr_id, created_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct DecisionRow {
    id: i64,
    date: String,
    ticker: String,
    action: String,
    entry: f64,
    atr: f64,
    stop_distance: f64,
    initial_stop: f64,
    shares: i64,
    contracts: i64,
    risk_dollars: f64,
    banner: String,
    method: Option<String>,
    delta: f64,
    max_loss: f64,
    bucket: Option<String>,
    reason: Option<String>,
    corr_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<DecisionRow> for Decision {
    type Error = EngineError;

    fn try_from(row: DecisionRow) -> Result<Self, Self::Error> {
        Ok(Decision {
            id: row.id,
            date: row.date,
            ticker: row.ticker,
            action: row.action.parse()?,
            entry: row.entry,
            atr: row.atr,
            stop_distance: row.stop_distance,
            initial_stop: row.initial_stop,
            shares: row.shares,
            contracts: row.contracts,
            risk_dollars: row.risk_dollars,
            banner: row.banner.parse::<Banner>()?,
            method: row.method.map(|m| m.parse()).transpose()?,
            delta: row.delta,
            max_loss: row.max_loss,
            bucket: row.bucket,
            reason: row.reason,
            corr_id: row.corr_id,
            created_at: row.created_at,
        })
    }
}

/// Saved trading decisions
#[derive(Clone)]
pub struct DecisionStore {
    db: Database,
}

impl DecisionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Store a decision. A second decision for the same ticker and date is a conflict.
    pub async fn save(&self, decision: &NewDecision) -> EngineResult<i64> {
        let mut conn = self.db.pool().acquire().await?;
        Self::save_in(&mut conn, decision).await
    }

    /// `save` on a caller-supplied connection, so the insert can join a larger
    /// transaction.
    pub async fn save_in(conn: &mut SqliteConnection, decision: &NewDecision) -> EngineResult<i64> {
        let ticker = normalize_ticker(&decision.ticker);
        if ticker.is_empty() {
            return Err(EngineError::validation("ticker is required"));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO decisions (
                date, ticker, action, entry, atr, stop_distance,
                initial_stop, shares, contracts, risk_dollars, banner,
                method, delta, max_loss, bucket, reason, corr_id, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&decision.date)
        .bind(&ticker)
        .bind(decision.action.as_str())
        .bind(decision.entry)
        .bind(decision.atr)
        .bind(decision.stop_distance)
        .bind(decision.initial_stop)
        .bind(decision.shares)
        .bind(decision.contracts)
        .bind(decision.risk_dollars)
        .bind(decision.banner.as_str())
        .bind(decision.method.map(|m| m.as_str()))
        .bind(decision.delta)
        .bind(decision.max_loss)
        .bind(&decision.bucket)
        .bind(&decision.reason)
        .bind(&decision.corr_id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await
        .map_err(|e| match EngineError::from(e) {
            EngineError::Conflict(_) => EngineError::conflict(format!(
                "decision already exists for {} on {}",
                ticker, decision.date
            )),
            other => other,
        })?;

        let id = result.last_insert_rowid();
        tracing::info!(
            "Saved {} decision #{} for {} ({})",
            decision.action,
            id,
            ticker,
            decision.date
        );
        Ok(id)
    }

    pub async fn get(&self, id: i64) -> EngineResult<Decision> {
        let row: Option<DecisionRow> =
            sqlx::query_as(&format!("SELECT {DECISION_COLUMNS} FROM decisions WHERE id = ?"))
                .bind(id)
                .fetch_optional(self.db.pool())
                .await?;

        row.ok_or_else(|| EngineError::not_found(format!("decision {id} not found")))?
            .try_into()
    }

    pub async fn for_today(&self, ticker: &str) -> EngineResult<Option<Decision>> {
        self.for_date(ticker, &trading_day()).await
    }

    pub async fn for_date(&self, ticker: &str, date: &str) -> EngineResult<Option<Decision>> {
        let mut conn = self.db.pool().acquire().await?;
        Self::find_for_date(&mut conn, ticker, date).await
    }

    /// Same as `for_date` but on a caller-supplied connection, so the lookup can
    /// join a larger transaction.
    pub async fn find_for_date(
        conn: &mut SqliteConnection,
        ticker: &str,
        date: &str,
    ) -> EngineResult<Option<Decision>> {
        let row: Option<DecisionRow> = sqlx::query_as(&format!(
            "SELECT {DECISION_COLUMNS} FROM decisions WHERE ticker = ? AND date = ? LIMIT 1"
        ))
        .bind(normalize_ticker(ticker))
        .bind(date)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(Decision::try_from).transpose()
    }

    pub async fn exists_for_date(&self, ticker: &str, date: &str) -> EngineResult<bool> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM decisions WHERE ticker = ? AND date = ?")
                .bind(normalize_ticker(ticker))
                .bind(date)
                .fetch_one(self.db.pool())
                .await?;
        Ok(count > 0)
    }
}

fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}
