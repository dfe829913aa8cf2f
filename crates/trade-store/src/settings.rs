use async_trait::async_trait;
use dashmap::DashMap;
use engine_core::{EngineError, EngineResult, SettingsProvider};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::db::Database;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CachedValue {
    value: String,
    expires_at: Instant,
}

impl CachedValue {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// SQLite-backed account settings with a private read-through TTL cache.
#[derive(Clone)]
pub struct SettingsStore {
    db: Database,
    cache: Arc<DashMap<String, CachedValue>>,
    ttl: Duration,
}

impl SettingsStore {
    pub fn new(db: Database) -> Self {
        Self::with_ttl(db, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(db: Database, ttl: Duration) -> Self {
        Self {
            db,
            cache: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Insert or update a setting and drop its cached value.
    pub async fn set_setting(&self, key: &str, value: &str) -> EngineResult<()> {
        if key.trim().is_empty() {
            return Err(EngineError::validation("setting key cannot be empty"));
        }

        sqlx::query(
            r#"
            INSERT INTO settings (key, value)
            VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = datetime('now')
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(self.db.pool())
        .await?;

        self.cache.remove(key);
        tracing::info!("Setting {} updated", key);
        Ok(())
    }

    /// All settings, read straight from storage
    pub async fn all_settings(&self) -> EngineResult<BTreeMap<String, String>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM settings ORDER BY key")
                .fetch_all(self.db.pool())
                .await?;

        for (key, value) in &rows {
            self.remember(key, value);
        }

        Ok(rows.into_iter().collect())
    }

    /// Periodically evict expired cache entries. The task ends once every
    /// clone of this store has been dropped.
    pub fn spawn_cache_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let cache: Weak<DashMap<String, CachedValue>> = Arc::downgrade(&self.cache);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(live) = cache.upgrade() else { break };
                let evicted = sweep(&live);
                if evicted > 0 {
                    tracing::debug!("Settings cache sweep evicted {} entries", evicted);
                }
            }
        })
    }

    pub fn sweep_expired(&self) -> usize {
        sweep(&self.cache)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    fn remember(&self, key: &str, value: &str) {
        self.cache.insert(
            key.to_string(),
            CachedValue {
                value: value.to_string(),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}

fn sweep(cache: &DashMap<String, CachedValue>) -> usize {
    let now = Instant::now();
    let before = cache.len();
    cache.retain(|_, entry| entry.is_live(now));
    before.saturating_sub(cache.len())
}

#[async_trait]
impl SettingsProvider for SettingsStore {
    async fn get_setting(&self, key: &str) -> EngineResult<String> {
        if let Some(entry) = self.cache.get(key) {
            if entry.is_live(Instant::now()) {
                return Ok(entry.value.clone());
            }
        }

        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(self.db.pool())
            .await?;

        let (value,) = row.ok_or_else(|| EngineError::not_found(format!("setting not found: {key}")))?;
        self.remember(key, &value);
        Ok(value)
    }
}
