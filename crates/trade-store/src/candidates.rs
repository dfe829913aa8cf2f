use engine_core::{Candidate, EngineError, EngineResult};
use sqlx::SqliteConnection;

use crate::db::Database;

/// Screener presets and the daily candidate lists imported from them
#[derive(Clone)]
pub struct CandidateStore {
    db: Database,
}

impl CandidateStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Id of the preset with this name, creating it on first use.
    pub async fn get_or_create_preset(&self, name: &str, query_string: &str) -> EngineResult<i64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::validation("preset name cannot be empty"));
        }

        sqlx::query("INSERT INTO presets (name, query_string) VALUES (?, ?) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .bind(query_string)
            .execute(self.db.pool())
            .await?;

        let (id,): (i64,) = sqlx::query_as("SELECT id FROM presets WHERE name = ?")
            .bind(name)
            .fetch_one(self.db.pool())
            .await?;

        Ok(id)
    }

    /// Replace the candidate list for (date, preset) with `tickers`.
    pub async fn import_candidates(
        &self,
        date: &str,
        tickers: &[String],
        preset_id: Option<i64>,
        sector: Option<&str>,
        bucket: Option<&str>,
    ) -> EngineResult<usize> {
        let mut unique: Vec<String> = tickers
            .iter()
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .collect();
        unique.sort();
        unique.dedup();

        if unique.is_empty() {
            return Err(EngineError::validation("at least one ticker required"));
        }

        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM candidates WHERE date = ? AND preset_id IS ?")
            .bind(date)
            .bind(preset_id)
            .execute(&mut *tx)
            .await?;

        for ticker in &unique {
            sqlx::query(
                r#"
                INSERT INTO candidates (date, ticker, preset_id, sector, bucket)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(date, ticker, preset_id) DO UPDATE SET
                    sector = excluded.sector,
                    bucket = excluded.bucket
                "#,
            )
            .bind(date)
            .bind(ticker)
            .bind(preset_id)
            .bind(sector)
            .bind(bucket)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!("Imported {} candidates for {}", unique.len(), date);
        Ok(unique.len())
    }

    pub async fn candidates_for_date(&self, date: &str) -> EngineResult<Vec<Candidate>> {
        let candidates = sqlx::query_as::<_, Candidate>(
            r#"
            SELECT c.id, c.date, c.ticker, c.preset_id, p.name AS preset_name, c.sector, c.bucket
            FROM candidates c
            LEFT JOIN presets p ON c.preset_id = p.id
            WHERE c.date = ?
            ORDER BY c.ticker, c.id
            "#,
        )
        .bind(date)
        .fetch_all(self.db.pool())
        .await?;

        Ok(candidates)
    }

    pub async fn bucket_for(&self, date: &str, ticker: &str) -> EngineResult<Option<String>> {
        let mut conn = self.db.pool().acquire().await?;
        Self::find_bucket(&mut conn, date, ticker).await
    }

    /// Bucket of `ticker` on the `date` list, on a caller-supplied connection.
    /// `None` when the ticker was not screened that day.
    pub async fn find_bucket(
        conn: &mut SqliteConnection,
        date: &str,
        ticker: &str,
    ) -> EngineResult<Option<String>> {
        let row: Option<(Option<String>,)> = sqlx::query_as(
            "SELECT bucket FROM candidates WHERE date = ? AND ticker = ? ORDER BY id LIMIT 1",
        )
        .bind(date)
        .bind(ticker.trim().to_uppercase())
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row.and_then(|(bucket,)| bucket))
    }

    pub async fn is_candidate(&self, date: &str, ticker: &str) -> EngineResult<bool> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM candidates WHERE date = ? AND ticker = ?")
                .bind(date)
                .bind(ticker.trim().to_uppercase())
                .fetch_one(self.db.pool())
                .await?;
        Ok(count > 0)
    }

    pub async fn count_for_date(&self, date: &str) -> EngineResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM candidates WHERE date = ?")
            .bind(date)
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }
}
