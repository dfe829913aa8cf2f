use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub database_url: String,
    pub settings_cache_ttl_seconds: u64,   // 300 (5 minutes)
    pub cache_sweep_interval_seconds: u64, // 300
    pub status_interval_seconds: u64,      // 300
    pub history_limit: i64,                // sessions listed at startup
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:tf-engine.db".to_string()),
            settings_cache_ttl_seconds: parse_or(&lookup, "SETTINGS_CACHE_TTL_SECONDS", 300)?,
            cache_sweep_interval_seconds: parse_or(&lookup, "CACHE_SWEEP_INTERVAL_SECONDS", 300)?,
            status_interval_seconds: parse_or(&lookup, "STATUS_INTERVAL_SECONDS", 300)?,
            history_limit: parse_or(&lookup, "HISTORY_LIMIT", 20)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            bail!("DATABASE_URL must not be empty");
        }
        if self.settings_cache_ttl_seconds == 0 {
            bail!("SETTINGS_CACHE_TTL_SECONDS must be greater than zero");
        }
        if self.cache_sweep_interval_seconds == 0 {
            bail!("CACHE_SWEEP_INTERVAL_SECONDS must be greater than zero");
        }
        if self.status_interval_seconds == 0 {
            bail!("STATUS_INTERVAL_SECONDS must be greater than zero");
        }
        Ok(())
    }

    pub fn settings_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.settings_cache_ttl_seconds)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_seconds)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_seconds)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} is not a valid number: {raw:?}")),
        None => Ok(default),
    }
}
