use chrono::{DateTime, Utc};
use engine_core::HeatStatus;
use serde::{Deserialize, Serialize};

/// A lockout on entering new trades in a sector bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketCooldown {
    pub id: i64,
    pub bucket: String,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub active: bool,
    pub reason: String,
}

impl BucketCooldown {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whole hours until expiry, rounded up
    pub fn hours_remaining(&self, now: DateTime<Utc>) -> i64 {
        let secs = (self.expires_at - now).num_seconds().max(0);
        (secs + 3599) / 3600
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct BucketCooldownRow {
    pub id: i64,
    pub bucket: String,
    pub started_at: i64,
    pub expires_at: i64,
    pub active: bool,
    pub reason: String,
}

impl From<BucketCooldownRow> for BucketCooldown {
    fn from(row: BucketCooldownRow) -> Self {
        Self {
            id: row.id,
            bucket: row.bucket,
            started_at: from_unix(row.started_at),
            expires_at: from_unix(row.expires_at),
            active: row.active,
            reason: row.reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CooldownCheck {
    Clear,
    Blocked {
        bucket: String,
        hours_remaining: i64,
        message: String,
    },
}

impl CooldownCheck {
    pub fn is_blocked(&self) -> bool {
        matches!(self, CooldownCheck::Blocked { .. })
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            CooldownCheck::Clear => None,
            CooldownCheck::Blocked { message, .. } => Some(message),
        }
    }
}

/// Mandatory wait between a GREEN checklist and a GO decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpulseTimer {
    pub id: i64,
    pub ticker: String,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub active: bool,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ImpulseTimerRow {
    pub id: i64,
    pub ticker: String,
    pub started_at: i64,
    pub expires_at: i64,
    pub active: bool,
}

impl From<ImpulseTimerRow> for ImpulseTimer {
    fn from(row: ImpulseTimerRow) -> Self {
        Self {
            id: row.id,
            ticker: row.ticker,
            started_at: from_unix(row.started_at),
            expires_at: from_unix(row.expires_at),
            active: row.active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BrakeCheck {
    Released,
    NoTimer { ticker: String },
    Engaged { ticker: String, seconds_remaining: i64 },
}

impl BrakeCheck {
    pub fn is_released(&self) -> bool {
        matches!(self, BrakeCheck::Released)
    }

    pub fn message(&self) -> Option<String> {
        match self {
            BrakeCheck::Released => None,
            BrakeCheck::NoTimer { ticker } => Some(format!(
                "no impulse timer active for {ticker} (evaluate checklist first)"
            )),
            BrakeCheck::Engaged {
                seconds_remaining, ..
            } => Some(format!(
                "impulse brake active, wait {seconds_remaining} more seconds"
            )),
        }
    }
}

/// Heat verdict for a proposed addition of risk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatCheck {
    pub status: HeatStatus,
    pub bucket: String,
    pub proposed_risk: f64,
    pub portfolio_current: f64,
    pub portfolio_new: f64,
    pub portfolio_cap: f64,
    pub portfolio_overage: f64,
    pub bucket_current: f64,
    pub bucket_new: f64,
    pub bucket_cap: f64,
    pub bucket_overage: f64,
    pub rejection_reason: Option<String>,
    pub evaluated_at: DateTime<Utc>,
}

impl HeatCheck {
    pub fn allowed(&self) -> bool {
        self.status.allows_entry()
    }
}

pub(crate) fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_default()
}
