//! Portfolio and sector-bucket heat: the open dollars at risk, compared against
//! caps derived from account equity.
//!
//! ```text
//! equity 10,000   heat cap 4%   bucket cap 1.5%
//! open risk 350 + proposed 75 = 425 > 400      -> REJECT
//! ```

use std::sync::Arc;

use chrono::Utc;
use engine_core::{money, AccountSettings, EngineError, EngineResult, HeatSource, HeatStatus, SettingsProvider};

use crate::models::HeatCheck;

#[derive(Clone)]
pub struct RiskGateEngine {
    heat: Arc<dyn HeatSource>,
    settings: Arc<dyn SettingsProvider>,
}

impl RiskGateEngine {
    pub fn new(heat: Arc<dyn HeatSource>, settings: Arc<dyn SettingsProvider>) -> Self {
        Self { heat, settings }
    }

    pub async fn portfolio_heat(&self) -> EngineResult<f64> {
        self.heat.portfolio_heat().await
    }

    pub async fn bucket_heat(&self, bucket: &str) -> EngineResult<f64> {
        if bucket.is_empty() {
            return Ok(0.0);
        }
        self.heat.bucket_heat(bucket).await
    }

    /// Classify adding `proposed_risk` dollars to `bucket`. The verdict is
    /// advisory; callers decide whether REJECT stops the trade.
    pub async fn evaluate(&self, proposed_risk: f64, bucket: &str) -> EngineResult<HeatCheck> {
        let settings = self.settings.account_settings().await?;
        let portfolio_current = self.portfolio_heat().await?;
        let bucket_current = self.bucket_heat(bucket).await?;

        let check = classify(
            &settings,
            proposed_risk,
            bucket,
            portfolio_current,
            bucket_current,
        )?;

        match &check.rejection_reason {
            Some(reason) => tracing::warn!("Heat REJECT for bucket {:?}: {}", bucket, reason),
            None => tracing::debug!(
                "Heat OK: portfolio {:.2}/{:.2}, bucket {:.2}/{:.2}",
                check.portfolio_new,
                check.portfolio_cap,
                check.bucket_new,
                check.bucket_cap
            ),
        }
        Ok(check)
    }
}

/// Pure heat arithmetic over already-aggregated figures.
pub fn classify(
    settings: &AccountSettings,
    proposed_risk: f64,
    bucket: &str,
    portfolio_current: f64,
    bucket_current: f64,
) -> EngineResult<HeatCheck> {
    if settings.equity <= 0.0 {
        return Err(EngineError::validation(format!(
            "equity must be positive, got {:.2}",
            settings.equity
        )));
    }
    if settings.heat_cap_pct <= 0.0 || settings.heat_cap_pct > 1.0 {
        return Err(EngineError::validation(format!(
            "heat cap must be between 0 and 1, got {:.4}",
            settings.heat_cap_pct
        )));
    }
    if settings.bucket_heat_cap_pct <= 0.0 || settings.bucket_heat_cap_pct > 1.0 {
        return Err(EngineError::validation(format!(
            "bucket heat cap must be between 0 and 1, got {:.4}",
            settings.bucket_heat_cap_pct
        )));
    }
    if proposed_risk < 0.0 || !proposed_risk.is_finite() {
        return Err(EngineError::validation(format!(
            "proposed risk must be non-negative, got {proposed_risk:.2}"
        )));
    }

    let portfolio_cap = settings.portfolio_cap();
    let bucket_cap = settings.bucket_cap();
    let portfolio_new = money::add(portfolio_current, proposed_risk);
    let bucket_new = money::add(bucket_current, proposed_risk);

    let portfolio_overage = overage(portfolio_new, portfolio_cap);
    let bucket_overage = overage(bucket_new, bucket_cap);

    let rejection_reason = if portfolio_overage > 0.0 {
        Some(format!(
            "Portfolio heat (${portfolio_new:.2}) exceeds cap (${portfolio_cap:.2}) by ${portfolio_overage:.2}"
        ))
    } else if bucket_overage > 0.0 {
        Some(format!(
            "Bucket '{bucket}' heat (${bucket_new:.2}) exceeds cap (${bucket_cap:.2}) by ${bucket_overage:.2}"
        ))
    } else {
        None
    };

    Ok(HeatCheck {
        status: if rejection_reason.is_some() {
            HeatStatus::Reject
        } else {
            HeatStatus::Ok
        },
        bucket: bucket.to_string(),
        proposed_risk,
        portfolio_current,
        portfolio_new,
        portfolio_cap,
        portfolio_overage,
        bucket_current,
        bucket_new,
        bucket_cap,
        bucket_overage,
        rejection_reason,
        evaluated_at: Utc::now(),
    })
}

fn overage(new: f64, cap: f64) -> f64 {
    if new > cap {
        money::add(new, -cap)
    } else {
        0.0
    }
}
