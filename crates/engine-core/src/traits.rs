use async_trait::async_trait;

use crate::error::{EngineError, EngineResult};
use crate::money;

/// Setting keys understood by the risk engines.
pub mod keys {
    pub const EQUITY: &str = "Equity_E";
    pub const RISK_PCT: &str = "RiskPct_r";
    pub const HEAT_CAP_PCT: &str = "HeatCap_H_pct";
    pub const BUCKET_HEAT_CAP_PCT: &str = "BucketHeatCap_pct";
    pub const STOP_MULTIPLE: &str = "StopMultiple_K";
    pub const MAX_UNITS: &str = "MaxUnits";
}

pub const DEFAULT_MAX_UNITS: i64 = 4;

/// Account-level key/value settings. Implementations may cache; callers must not.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn get_setting(&self, key: &str) -> EngineResult<String>;

    async fn account_settings(&self) -> EngineResult<AccountSettings> {
        AccountSettings::load(self).await
    }
}

/// Sum of open at-risk dollars, overall and per bucket.
#[async_trait]
pub trait HeatSource: Send + Sync {
    async fn portfolio_heat(&self) -> EngineResult<f64>;
    async fn bucket_heat(&self, bucket: &str) -> EngineResult<f64>;
}

/// Typed view over the account settings
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AccountSettings {
    pub equity: f64,
    pub risk_pct: f64,
    pub heat_cap_pct: f64,
    pub bucket_heat_cap_pct: f64,
    pub stop_multiple: f64,
    pub max_units: i64,
}

impl AccountSettings {
    pub async fn load<P>(provider: &P) -> EngineResult<Self>
    where
        P: SettingsProvider + ?Sized,
    {
        let max_units = match provider.get_setting(keys::MAX_UNITS).await {
            Ok(raw) => parse(keys::MAX_UNITS, &raw)?,
            Err(EngineError::NotFound(_)) => DEFAULT_MAX_UNITS,
            Err(e) => return Err(e),
        };

        Ok(Self {
            equity: parse(keys::EQUITY, &provider.get_setting(keys::EQUITY).await?)?,
            risk_pct: parse(keys::RISK_PCT, &provider.get_setting(keys::RISK_PCT).await?)?,
            heat_cap_pct: parse(
                keys::HEAT_CAP_PCT,
                &provider.get_setting(keys::HEAT_CAP_PCT).await?,
            )?,
            bucket_heat_cap_pct: parse(
                keys::BUCKET_HEAT_CAP_PCT,
                &provider.get_setting(keys::BUCKET_HEAT_CAP_PCT).await?,
            )?,
            stop_multiple: parse(
                keys::STOP_MULTIPLE,
                &provider.get_setting(keys::STOP_MULTIPLE).await?,
            )?,
            max_units,
        })
    }

    /// Portfolio heat cap in dollars
    pub fn portfolio_cap(&self) -> f64 {
        money::fraction_of(self.equity, self.heat_cap_pct)
    }

    /// Bucket heat cap in dollars
    pub fn bucket_cap(&self) -> f64 {
        money::fraction_of(self.equity, self.bucket_heat_cap_pct)
    }

    /// Dollar risk budget for a single trade
    pub fn risk_per_trade(&self) -> f64 {
        money::fraction_of(self.equity, self.risk_pct)
    }
}

fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> EngineResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| EngineError::validation(format!("setting {key} is not a number: {raw:?}")))
}
