use std::sync::Arc;

use chrono::{DateTime, Utc};
use engine_core::{
    trading_day, Banner, DecisionAction, EngineError, EngineResult, NewDecision, SessionStep,
    SettingsProvider, SizingMethod,
};
use position_ledger::{Position, PositionLedger};
use risk_manager::{
    size_stock_for, ChecklistItems, CooldownManager, ImpulseBrake, RiskGateEngine,
};
use serde::Serialize;
use trade_store::{CandidateStore, Database, DecisionStore};

use crate::engine::TradeSessionEngine;
use crate::models::{EntryGates, HeatReading, PyramidPlan, SizingInput, TradeSession};

/// Result of the final entry step
#[derive(Debug, Clone, Serialize)]
pub struct EntryOutcome {
    pub session: TradeSession,
    pub decision_id: i64,
    pub position: Option<Position>,
}

/// Wires the session engine to the risk engines and the ledger so a caller
/// only pushes trader input.
#[derive(Clone)]
pub struct TradeWorkflow {
    db: Database,
    settings: Arc<dyn SettingsProvider>,
    sessions: TradeSessionEngine,
    risk: RiskGateEngine,
    cooldowns: CooldownManager,
    brake: ImpulseBrake,
    ledger: PositionLedger,
    candidates: CandidateStore,
}

impl TradeWorkflow {
    pub fn new(db: Database, settings: Arc<dyn SettingsProvider>) -> Self {
        let ledger = PositionLedger::new(db.clone());
        Self {
            sessions: TradeSessionEngine::new(db.clone()),
            risk: RiskGateEngine::new(Arc::new(ledger.clone()), settings.clone()),
            cooldowns: CooldownManager::new(db.clone()),
            brake: ImpulseBrake::new(db.clone()),
            candidates: CandidateStore::new(db.clone()),
            settings,
            ledger,
            db,
        }
    }

    pub fn sessions(&self) -> &TradeSessionEngine {
        &self.sessions
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn cooldowns(&self) -> &CooldownManager {
        &self.cooldowns
    }

    pub fn risk(&self) -> &RiskGateEngine {
        &self.risk
    }

    pub fn brake(&self) -> &ImpulseBrake {
        &self.brake
    }

    /// Record the checklist; a GREEN banner starts the impulse brake.
    pub async fn record_checklist(
        &self,
        id: i64,
        banner: Banner,
        missing_count: i64,
        quality_score: i64,
    ) -> EngineResult<TradeSession> {
        let session = self
            .sessions
            .update_checklist(id, banner, missing_count, quality_score)
            .await?;
        if banner.is_green() {
            self.brake.start(&session.ticker).await?;
        }
        Ok(session)
    }

    /// Evaluate the six checklist items and record the resulting banner.
    pub async fn record_checklist_items(
        &self,
        id: i64,
        items: &ChecklistItems,
        quality_score: i64,
    ) -> EngineResult<TradeSession> {
        let eval = items.evaluate();
        if !eval.missing_items.is_empty() {
            tracing::info!(
                "Session #{} checklist {}: missing {}",
                id,
                eval.banner,
                eval.missing_items.join(", ")
            );
        }
        self.record_checklist(id, eval.banner, eval.missing_count, quality_score)
            .await
    }

    /// Size a stock entry from ATR using the account's equity, risk fraction
    /// and stop multiple, then record it.
    pub async fn size_stock_entry(
        &self,
        id: i64,
        entry: f64,
        atr: f64,
        pyramid: Option<PyramidPlan>,
    ) -> EngineResult<TradeSession> {
        let settings = self.settings.account_settings().await?;
        let sized = size_stock_for(&settings, entry, atr)?;
        if sized.shares == 0 {
            return Err(EngineError::validation(format!(
                "risk budget ${:.2} buys no shares at a stop distance of {:.2}",
                sized.risk_dollars, sized.stop_distance
            )));
        }

        let sizing = SizingInput {
            method: SizingMethod::Stock,
            entry,
            atr,
            stop_multiple: settings.stop_multiple,
            stop_distance: sized.stop_distance,
            initial_stop: sized.initial_stop,
            shares: sized.shares,
            contracts: 0,
            risk_dollars: sized.actual_risk,
            delta: 0.0,
        };
        self.record_sizing(id, sizing, pyramid).await
    }

    pub async fn record_sizing(
        &self,
        id: i64,
        sizing: SizingInput,
        pyramid: Option<PyramidPlan>,
    ) -> EngineResult<TradeSession> {
        self.sessions.update_sizing(id, sizing, pyramid).await
    }

    /// Evaluate heat for the session's sized risk in the ticker's bucket and
    /// record the verdict.
    pub async fn evaluate_heat(&self, id: i64) -> EngineResult<TradeSession> {
        let session = self.sessions.get_session(id).await?;
        let sizing = session.gates.sizing.as_ref().ok_or_else(|| {
            EngineError::validation(format!("session #{id} has no sizing to evaluate"))
        })?;

        let bucket = self.bucket_for(&session.ticker).await?;
        let check = self
            .risk
            .evaluate(sizing.sizing.risk_dollars, &bucket)
            .await?;
        self.sessions
            .update_heat(id, HeatReading::from(&check))
            .await
    }

    /// Re-check all five gates, then save the decision, complete the session
    /// and open the position on GO in one transaction. A GO with any failing
    /// gate is refused and the session is left at ENTRY.
    pub async fn finalize_entry(
        &self,
        id: i64,
        action: DecisionAction,
    ) -> EngineResult<EntryOutcome> {
        self.finalize_entry_at(id, action, Utc::now()).await
    }

    pub async fn finalize_entry_at(
        &self,
        id: i64,
        action: DecisionAction,
        now: DateTime<Utc>,
    ) -> EngineResult<EntryOutcome> {
        let session = self.sessions.get_session(id).await?;
        if !session.is_draft() || session.current_step != SessionStep::Entry {
            return Err(EngineError::validation(format!(
                "session #{id} is not ready for entry ({} at {})",
                session.status, session.current_step
            )));
        }

        let ticker = session.ticker.clone();
        let bucket = self.bucket_for(&ticker).await?;
        let gates = self.entry_gates(&session, &bucket, now).await?;

        if action == DecisionAction::Go {
            if !gates.all_passed() {
                return Err(EngineError::validation(format!(
                    "GO refused for {ticker}: {}",
                    gates.failures().join(", ")
                )));
            }
            if self.ledger.open_position(&ticker).await?.is_some() {
                return Err(EngineError::conflict(format!(
                    "GO refused for {ticker}: position already open"
                )));
            }
        }

        let banner = session
            .gates
            .checklist
            .as_ref()
            .map(|c| c.banner)
            .unwrap_or(Banner::Red);
        let mut decision = match session.gates.sizing.as_ref() {
            Some(sizing) => {
                let s = &sizing.sizing;
                NewDecision {
                    date: trading_day(),
                    ticker: ticker.clone(),
                    action,
                    entry: s.entry,
                    atr: s.atr,
                    stop_distance: s.stop_distance,
                    initial_stop: s.initial_stop,
                    shares: s.shares,
                    contracts: s.contracts,
                    risk_dollars: s.risk_dollars,
                    banner,
                    method: Some(s.method),
                    delta: s.delta,
                    max_loss: 0.0,
                    bucket: None,
                    reason: None,
                    corr_id: None,
                }
            }
            None => NewDecision::no_go(ticker.clone(), banner, "sizing incomplete"),
        };
        decision.bucket = (!bucket.is_empty()).then(|| bucket.clone());
        decision.corr_id = Some(format!("session-{id}"));
        if action == DecisionAction::NoGo && decision.reason.is_none() {
            let failures = gates.failures();
            decision.reason = Some(if failures.is_empty() {
                "trader declined".to_string()
            } else {
                failures.join(", ")
            });
        }

        let mut tx = self.db.begin().await?;
        let decision_id = DecisionStore::save_in(&mut tx, &decision).await?;
        TradeSessionEngine::update_entry_in(&mut tx, id, action, decision_id, gates).await?;
        let position = match action {
            DecisionAction::Go => Some(PositionLedger::open_in(&mut tx, &ticker).await?),
            DecisionAction::NoGo => None,
        };
        tx.commit().await?;

        let session = self.sessions.get_session(id).await?;

        Ok(EntryOutcome {
            session,
            decision_id,
            position,
        })
    }

    async fn entry_gates(
        &self,
        session: &TradeSession,
        bucket: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<EntryGates> {
        let cooloff = self.brake.check_at(&session.ticker, now).await?;
        let cooldown = self.cooldowns.check_at(bucket, now).await?;

        // Heat is re-read here so open positions added since the Heat gate count.
        let heat_ok = match session.gates.sizing.as_ref() {
            Some(sizing) => self
                .risk
                .evaluate(sizing.sizing.risk_dollars, bucket)
                .await?
                .allowed(),
            None => false,
        };

        Ok(EntryGates {
            banner_green: session.gates.checklist_completed(),
            cooloff_elapsed: cooloff.is_released(),
            not_on_cooldown: !cooldown.is_blocked(),
            heat_ok,
            sizing_complete: session.gates.sizing_completed(),
        })
    }

    async fn bucket_for(&self, ticker: &str) -> EngineResult<String> {
        Ok(self
            .candidates
            .bucket_for(&trading_day(), ticker)
            .await?
            .unwrap_or_default())
    }
}
