use chrono::{DateTime, Duration, Utc};
use engine_core::EngineResult;
use sqlx::SqliteConnection;
use trade_store::Database;

use crate::models::{BucketCooldown, BucketCooldownRow, CooldownCheck};

/// How long a bucket stays locked after a losing trade
pub const COOLDOWN_HOURS: i64 = 24;

const COOLDOWN_COLUMNS: &str = "id, bucket, started_at, expires_at, active, reason";

/// Sector-bucket lockouts. At most one active cooldown exists per bucket; the
/// partial unique index on `bucket_cooldowns` guarantees it.
#[derive(Clone)]
pub struct CooldownManager {
    db: Database,
}

impl CooldownManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn duration() -> Duration {
        Duration::hours(COOLDOWN_HOURS)
    }

    /// Start a cooldown on `bucket`, or push out the expiry of the one already running.
    pub async fn trigger(&self, bucket: &str, reason: &str) -> EngineResult<()> {
        self.trigger_at(bucket, reason, Utc::now()).await
    }

    pub async fn trigger_at(
        &self,
        bucket: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        if bucket.is_empty() {
            return Ok(());
        }

        let mut tx = self.db.begin().await?;
        Self::trigger_in(&mut tx, bucket, reason, now).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Trigger on a caller's connection so a position close and its cooldown
    /// commit together.
    pub async fn trigger_in(
        conn: &mut SqliteConnection,
        bucket: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        if bucket.is_empty() {
            return Ok(());
        }

        let now_ts = now.timestamp();
        let expires_ts = (now + Self::duration()).timestamp();

        // A lapsed cooldown must not be extended; retire it so a fresh one starts.
        sqlx::query(
            "UPDATE bucket_cooldowns SET active = 0 WHERE bucket = ? AND active = 1 AND expires_at < ?",
        )
        .bind(bucket)
        .bind(now_ts)
        .execute(&mut *conn)
        .await?;

        let running: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM bucket_cooldowns WHERE bucket = ? AND active = 1",
        )
        .bind(bucket)
        .fetch_optional(&mut *conn)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO bucket_cooldowns (bucket, started_at, expires_at, active, reason)
            VALUES (?, ?, ?, 1, ?)
            ON CONFLICT(bucket) WHERE active = 1 DO UPDATE SET
                expires_at = MAX(bucket_cooldowns.expires_at, excluded.expires_at),
                reason = excluded.reason
            "#,
        )
        .bind(bucket)
        .bind(now_ts)
        .bind(expires_ts)
        .bind(reason)
        .execute(&mut *conn)
        .await?;

        if running.is_some() {
            tracing::info!("Extended cooldown on bucket {} ({})", bucket, reason);
        } else {
            tracing::warn!(
                "Bucket {} in cooldown for {}h ({})",
                bucket,
                COOLDOWN_HOURS,
                reason
            );
        }
        Ok(())
    }

    /// Active cooldown for `bucket`, deactivating it first if it has lapsed.
    pub async fn get(&self, bucket: &str) -> EngineResult<Option<BucketCooldown>> {
        self.get_at(bucket, Utc::now()).await
    }

    pub async fn get_at(
        &self,
        bucket: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<BucketCooldown>> {
        let row: Option<BucketCooldownRow> = sqlx::query_as(&format!(
            "SELECT {COOLDOWN_COLUMNS} FROM bucket_cooldowns WHERE bucket = ? AND active = 1 LIMIT 1"
        ))
        .bind(bucket)
        .fetch_optional(self.db.pool())
        .await?;

        let Some(cooldown) = row.map(BucketCooldown::from) else {
            return Ok(None);
        };

        if cooldown.is_expired(now) {
            sqlx::query("UPDATE bucket_cooldowns SET active = 0 WHERE id = ?")
                .bind(cooldown.id)
                .execute(self.db.pool())
                .await?;
            tracing::info!("Cooldown on bucket {} expired", bucket);
            return Ok(None);
        }

        Ok(Some(cooldown))
    }

    /// Every unexpired cooldown, ordered by bucket.
    pub async fn list_active(&self) -> EngineResult<Vec<BucketCooldown>> {
        self.list_active_at(Utc::now()).await
    }

    pub async fn list_active_at(&self, now: DateTime<Utc>) -> EngineResult<Vec<BucketCooldown>> {
        let now_ts = now.timestamp();

        let expired = sqlx::query(
            "UPDATE bucket_cooldowns SET active = 0 WHERE active = 1 AND expires_at < ?",
        )
        .bind(now_ts)
        .execute(self.db.pool())
        .await?
        .rows_affected();
        if expired > 0 {
            tracing::debug!("Deactivated {} lapsed cooldowns", expired);
        }

        let rows: Vec<BucketCooldownRow> = sqlx::query_as(&format!(
            "SELECT {COOLDOWN_COLUMNS} FROM bucket_cooldowns WHERE active = 1 AND expires_at > ? ORDER BY bucket"
        ))
        .bind(now_ts)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(BucketCooldown::from).collect())
    }

    /// Whether new entries in `bucket` are allowed right now.
    pub async fn check(&self, bucket: &str) -> EngineResult<CooldownCheck> {
        self.check_at(bucket, Utc::now()).await
    }

    pub async fn check_at(&self, bucket: &str, now: DateTime<Utc>) -> EngineResult<CooldownCheck> {
        if bucket.is_empty() {
            return Ok(CooldownCheck::Clear);
        }

        Ok(match self.get_at(bucket, now).await? {
            None => CooldownCheck::Clear,
            Some(cooldown) => {
                let hours_remaining = cooldown.hours_remaining(now);
                let unit = if hours_remaining == 1 { "hour" } else { "hours" };
                CooldownCheck::Blocked {
                    message: format!(
                        "bucket {bucket} is in cooldown ({hours_remaining} {unit} remaining)"
                    ),
                    bucket: bucket.to_string(),
                    hours_remaining,
                }
            }
        })
    }

    /// End a cooldown early. Returns false when none was running.
    pub async fn clear(&self, bucket: &str) -> EngineResult<bool> {
        let cleared = sqlx::query(
            "UPDATE bucket_cooldowns SET active = 0 WHERE bucket = ? AND active = 1",
        )
        .bind(bucket)
        .execute(self.db.pool())
        .await?
        .rows_affected();

        if cleared > 0 {
            tracing::info!("Cleared cooldown on bucket {}", bucket);
        }
        Ok(cleared > 0)
    }
}
