use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Declares a closed set of text codes persisted as SQLite TEXT and exchanged as
/// JSON strings.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = EngineError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(EngineError::Validation(format!(
                        "invalid {}: {:?}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

text_enum! {
    /// Trading system a session is evaluated under
    pub enum Strategy {
        LongBreakout => "LONG_BREAKOUT",
        ShortBreakout => "SHORT_BREAKOUT",
        Custom => "CUSTOM",
    }
}

text_enum! {
    /// Where a session's ticker came from
    pub enum SessionOrigin {
        Manual => "MANUAL",
        Preset => "PRESET",
    }
}

text_enum! {
    pub enum SessionStatus {
        Draft => "DRAFT",
        Evaluating => "EVALUATING",
        Completed => "COMPLETED",
        Abandoned => "ABANDONED",
    }
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Abandoned)
    }
}

text_enum! {
    /// Ordered workflow steps. Declaration order is the gate order.
    #[derive(PartialOrd, Ord)]
    pub enum SessionStep {
        Checklist => "CHECKLIST",
        Sizing => "SIZING",
        Heat => "HEAT",
        Entry => "ENTRY",
    }
}

impl SessionStep {
    /// Step that follows a successful gate at this step. Entry is the last one.
    pub fn next(&self) -> SessionStep {
        match self {
            SessionStep::Checklist => SessionStep::Sizing,
            SessionStep::Sizing => SessionStep::Heat,
            SessionStep::Heat | SessionStep::Entry => SessionStep::Entry,
        }
    }
}

text_enum! {
    /// Traffic-light checklist quality signal
    pub enum Banner {
        Green => "GREEN",
        Yellow => "YELLOW",
        Red => "RED",
    }
}

impl Banner {
    pub fn is_green(&self) -> bool {
        matches!(self, Banner::Green)
    }
}

text_enum! {
    pub enum HeatStatus {
        Ok => "OK",
        Warn => "WARN",
        Reject => "REJECT",
    }
}

impl HeatStatus {
    pub fn allows_entry(&self) -> bool {
        !matches!(self, HeatStatus::Reject)
    }
}

text_enum! {
    pub enum DecisionAction {
        Go => "GO",
        NoGo => "NO-GO",
    }
}

text_enum! {
    pub enum PositionStatus {
        Open => "OPEN",
        Closed => "CLOSED",
    }
}

text_enum! {
    /// Realized result recorded when a position is closed
    pub enum Outcome {
        Win => "WIN",
        Loss => "LOSS",
        Scratch => "SCRATCH",
    }
}

text_enum! {
    pub enum SizingMethod {
        Stock => "stock",
        OptDeltaAtr => "opt-delta-atr",
        OptContracts => "opt-contracts",
        OptMaxLoss => "opt-maxloss",
    }
}

/// A saved GO / NO-GO trading decision. At most one per (ticker, date).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: i64,
    pub date: String,
    pub ticker: String,
    pub action: DecisionAction,
    pub entry: f64,
    pub atr: f64,
    pub stop_distance: f64,
    pub initial_stop: f64,
    pub shares: i64,
    pub contracts: i64,
    pub risk_dollars: f64,
    pub banner: Banner,
    pub method: Option<SizingMethod>,
    pub delta: f64,
    pub max_loss: f64,
    pub bucket: Option<String>,
    pub reason: Option<String>,
    pub corr_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for `DecisionStore::save`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDecision {
    pub date: String,
    pub ticker: String,
    pub action: DecisionAction,
    pub entry: f64,
    pub atr: f64,
    pub stop_distance: f64,
    pub initial_stop: f64,
    pub shares: i64,
    pub contracts: i64,
    pub risk_dollars: f64,
    pub banner: Banner,
    pub method: Option<SizingMethod>,
    pub delta: f64,
    pub max_loss: f64,
    pub bucket: Option<String>,
    pub reason: Option<String>,
    pub corr_id: Option<String>,
}

impl NewDecision {
    /// A NO-GO decision for today with only the reason filled in.
    pub fn no_go(ticker: impl Into<String>, banner: Banner, reason: impl Into<String>) -> Self {
        Self {
            date: trading_day(),
            ticker: ticker.into(),
            action: DecisionAction::NoGo,
            entry: 0.0,
            atr: 0.0,
            stop_distance: 0.0,
            initial_stop: 0.0,
            shares: 0,
            contracts: 0,
            risk_dollars: 0.0,
            banner,
            method: None,
            delta: 0.0,
            max_loss: 0.0,
            bucket: None,
            reason: Some(reason.into()),
            corr_id: None,
        }
    }
}

/// One ticker from a daily screening import
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Candidate {
    pub id: i64,
    pub date: String,
    pub ticker: String,
    pub preset_id: Option<i64>,
    pub preset_name: Option<String>,
    pub sector: Option<String>,
    pub bucket: Option<String>,
}

/// Calendar date (local time, `YYYY-MM-DD`) that decisions and candidates are keyed by.
pub fn trading_day() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn steps_are_ordered() {
        assert!(SessionStep::Checklist < SessionStep::Sizing);
        assert!(SessionStep::Sizing < SessionStep::Heat);
        assert!(SessionStep::Heat < SessionStep::Entry);
        assert_eq!(SessionStep::Heat.next(), SessionStep::Entry);
        assert_eq!(SessionStep::Entry.next(), SessionStep::Entry);
    }

    #[test]
    fn text_codes_parse_and_print() {
        assert_eq!(DecisionAction::from_str("NO-GO").unwrap(), DecisionAction::NoGo);
        assert_eq!(SizingMethod::OptDeltaAtr.as_str(), "opt-delta-atr");
        assert_eq!(Outcome::Loss.to_string(), "LOSS");
        assert!(Banner::from_str("green").is_err());
        assert_eq!(
            serde_json::to_string(&HeatStatus::Reject).unwrap(),
            "\"REJECT\""
        );
    }

    #[test]
    fn terminal_statuses() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Abandoned.is_terminal());
        assert!(!SessionStatus::Draft.is_terminal());
        assert!(!HeatStatus::Reject.allows_entry());
        assert!(HeatStatus::Warn.allows_entry());
    }
}
