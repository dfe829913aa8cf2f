use chrono::{DateTime, Utc};
use engine_core::{
    money, Banner, DecisionAction, EngineError, EngineResult, HeatStatus, SessionOrigin,
    SessionStatus, SessionStep, SizingMethod, Strategy,
};
use risk_manager::HeatCheck;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One gated evaluation of a potential trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSession {
    /// Also the session number shown to traders
    pub id: i64,
    pub ticker: String,
    pub strategy: Strategy,
    pub origin: SessionOrigin,
    pub preset: Option<PresetLink>,
    pub status: SessionStatus,
    pub current_step: SessionStep,
    pub gates: GateResults,
    pub instrument: Option<InstrumentMeta>,
    pub pyramid: Option<PyramidPlan>,
    pub entry_decision_id: Option<i64>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TradeSession {
    pub fn is_draft(&self) -> bool {
        self.status == SessionStatus::Draft
    }
}

/// Where a preset-originated session came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetLink {
    pub candidate_id: i64,
    pub preset_id: i64,
    pub preset_name: String,
    pub scan_date: String,
}

/// Instrument details carried with the session but never interpreted by it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentMeta {
    pub instrument_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options_strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dte: Option<i64>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

impl InstrumentMeta {
    pub fn stock() -> Self {
        Self {
            instrument_type: "STOCK".to_string(),
            options_strategy: None,
            expiration_date: None,
            dte: None,
            details: Map::new(),
        }
    }
}

/// Add-on schedule for scaling into a winner: one unit at entry, then one more
/// every `add_step_n` multiples of N (ATR) above it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PyramidPlan {
    pub max_units: i64,
    pub add_step_n: f64,
    pub current_units: i64,
    pub add_prices: Vec<f64>,
}

impl PyramidPlan {
    pub fn van_tharp(entry: f64, n: f64, add_step_n: f64, max_units: i64) -> EngineResult<Self> {
        if entry <= 0.0 || n <= 0.0 {
            return Err(EngineError::validation(
                "pyramid plan needs a positive entry and N",
            ));
        }
        if add_step_n <= 0.0 {
            return Err(EngineError::validation("pyramid add step must be positive"));
        }
        if max_units < 1 {
            return Err(EngineError::validation(format!(
                "max units must be at least 1, got {max_units}"
            )));
        }

        let add_prices = (1..max_units)
            .map(|k| money::add(entry, money::fraction_of(n, add_step_n * k as f64)))
            .collect();

        Ok(Self {
            max_units,
            add_step_n,
            current_units: 1,
            add_prices,
        })
    }
}

/// Position sizing figures pushed by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingInput {
    pub method: SizingMethod,
    pub entry: f64,
    pub atr: f64,
    pub stop_multiple: f64,
    pub stop_distance: f64,
    pub initial_stop: f64,
    pub shares: i64,
    pub contracts: i64,
    pub risk_dollars: f64,
    pub delta: f64,
}

/// Heat verdict as recorded on a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatReading {
    pub status: HeatStatus,
    pub bucket: String,
    pub portfolio_current: f64,
    pub portfolio_new: f64,
    pub portfolio_cap: f64,
    pub bucket_current: f64,
    pub bucket_new: f64,
    pub bucket_cap: f64,
}

impl From<&HeatCheck> for HeatReading {
    fn from(check: &HeatCheck) -> Self {
        Self {
            status: check.status,
            bucket: check.bucket.clone(),
            portfolio_current: check.portfolio_current,
            portfolio_new: check.portfolio_new,
            portfolio_cap: check.portfolio_cap,
            bucket_current: check.bucket_current,
            bucket_new: check.bucket_new,
            bucket_cap: check.bucket_cap,
        }
    }
}

/// The five conditions a GO decision must satisfy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntryGates {
    pub banner_green: bool,
    pub cooloff_elapsed: bool,
    pub not_on_cooldown: bool,
    pub heat_ok: bool,
    pub sizing_complete: bool,
}

impl EntryGates {
    pub fn all_passed(&self) -> bool {
        self.failures().is_empty()
    }

    pub fn failures(&self) -> Vec<&'static str> {
        [
            (self.banner_green, "banner not GREEN"),
            (self.cooloff_elapsed, "impulse brake not elapsed"),
            (self.not_on_cooldown, "bucket on cooldown"),
            (self.heat_ok, "heat cap exceeded"),
            (self.sizing_complete, "sizing incomplete"),
        ]
        .into_iter()
        .filter(|(passed, _)| !passed)
        .map(|(_, reason)| reason)
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistGate {
    pub banner: Banner,
    pub missing_count: i64,
    pub quality_score: i64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingGate {
    pub sizing: SizingInput,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatGate {
    pub heat: HeatReading,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryGate {
    pub decision: DecisionAction,
    pub decision_id: Option<i64>,
    pub gates: EntryGates,
    pub recorded_at: DateTime<Utc>,
}

/// A recorded gate outcome, stored as JSON one row per (session, gate)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "gate", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateResult {
    Checklist(ChecklistGate),
    Sizing(SizingGate),
    Heat(HeatGate),
    Entry(EntryGate),
}

impl GateResult {
    pub fn step(&self) -> SessionStep {
        match self {
            GateResult::Checklist(_) => SessionStep::Checklist,
            GateResult::Sizing(_) => SessionStep::Sizing,
            GateResult::Heat(_) => SessionStep::Heat,
            GateResult::Entry(_) => SessionStep::Entry,
        }
    }

    /// Only a GREEN checklist lets the session move on; the other gates always do.
    pub fn passed(&self) -> bool {
        match self {
            GateResult::Checklist(gate) => gate.banner.is_green(),
            _ => true,
        }
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        match self {
            GateResult::Checklist(g) => g.recorded_at,
            GateResult::Sizing(g) => g.recorded_at,
            GateResult::Heat(g) => g.recorded_at,
            GateResult::Entry(g) => g.recorded_at,
        }
    }
}

/// Latest recorded result for each gate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateResults {
    pub checklist: Option<ChecklistGate>,
    pub sizing: Option<SizingGate>,
    pub heat: Option<HeatGate>,
    pub entry: Option<EntryGate>,
}

impl GateResults {
    pub(crate) fn insert(&mut self, result: GateResult) {
        match result {
            GateResult::Checklist(g) => self.checklist = Some(g),
            GateResult::Sizing(g) => self.sizing = Some(g),
            GateResult::Heat(g) => self.heat = Some(g),
            GateResult::Entry(g) => self.entry = Some(g),
        }
    }

    pub fn checklist_completed(&self) -> bool {
        self.checklist.as_ref().is_some_and(|g| g.banner.is_green())
    }

    pub fn sizing_completed(&self) -> bool {
        self.sizing.is_some()
    }

    pub fn heat_completed(&self) -> bool {
        self.heat.is_some()
    }

    pub fn entry_completed(&self) -> bool {
        self.entry.is_some()
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SessionRow {
    pub id: i64,
    pub ticker: String,
    pub strategy: String,
    pub origin: String,
    pub candidate_id: Option<i64>,
    pub preset_id: Option<i64>,
    pub preset_name: Option<String>,
    pub scan_date: Option<String>,
    pub status: String,
    pub current_step: String,
    pub instrument_json: Option<String>,
    pub pyramid_json: Option<String>,
    pub entry_decision_id: Option<i64>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

pub(crate) const SESSION_COLUMNS: &str = r#"
    id, ticker, strategy, origin, candidate_id, preset_id, preset_name, scan_date,
    status, current_step, instrument_json, pyramid_json, entry_decision_id,
    version, created_at, updated_at, completed_at
"#;

impl SessionRow {
    pub(crate) fn into_session(self, gates: GateResults) -> EngineResult<TradeSession> {
        let preset = match (self.candidate_id, self.preset_id) {
            (Some(candidate_id), Some(preset_id)) => Some(PresetLink {
                candidate_id,
                preset_id,
                preset_name: self.preset_name.unwrap_or_default(),
                scan_date: self.scan_date.unwrap_or_default(),
            }),
            _ => None,
        };

        Ok(TradeSession {
            id: self.id,
            ticker: self.ticker,
            strategy: self.strategy.parse()?,
            origin: self.origin.parse()?,
            preset,
            status: self.status.parse()?,
            current_step: self.current_step.parse()?,
            gates,
            instrument: self
                .instrument_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            pyramid: self
                .pyramid_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            entry_decision_id: self.entry_decision_id,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}
