use chrono::Utc;
use engine_core::{
    Banner, DecisionAction, EngineError, EngineResult, SessionOrigin, SessionStatus, SessionStep,
    Strategy,
};
use sqlx::SqliteConnection;
use trade_store::Database;

use crate::models::*;

pub const DEFAULT_HISTORY_LIMIT: i64 = 100;

/// Drives sessions through CHECKLIST -> SIZING -> HEAT -> ENTRY.
///
/// Every update runs in one transaction and bumps the session's `version`; an
/// update that finds the version changed underneath it fails with `Conflict`.
#[derive(Clone)]
pub struct TradeSessionEngine {
    db: Database,
}

struct NewSession<'a> {
    ticker: &'a str,
    strategy: Strategy,
    origin: SessionOrigin,
    preset: Option<&'a PresetLink>,
    instrument: Option<&'a InstrumentMeta>,
}

impl TradeSessionEngine {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create_session(&self, ticker: &str, strategy: Strategy) -> EngineResult<TradeSession> {
        self.insert(NewSession {
            ticker,
            strategy,
            origin: SessionOrigin::Manual,
            preset: None,
            instrument: None,
        })
        .await
    }

    /// Session for a ticker picked from a screening preset's candidate list.
    pub async fn create_session_from_preset(
        &self,
        ticker: &str,
        strategy: Strategy,
        preset: &PresetLink,
    ) -> EngineResult<TradeSession> {
        self.insert(NewSession {
            ticker,
            strategy,
            origin: SessionOrigin::Preset,
            preset: Some(preset),
            instrument: None,
        })
        .await
    }

    pub async fn create_session_with_instrument(
        &self,
        ticker: &str,
        strategy: Strategy,
        instrument: &InstrumentMeta,
    ) -> EngineResult<TradeSession> {
        self.insert(NewSession {
            ticker,
            strategy,
            origin: SessionOrigin::Manual,
            preset: None,
            instrument: Some(instrument),
        })
        .await
    }

    async fn insert(&self, new: NewSession<'_>) -> EngineResult<TradeSession> {
        let ticker = new.ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(EngineError::validation("ticker is required"));
        }
        let instrument_json = new.instrument.map(serde_json::to_string).transpose()?;
        let now = Utc::now();

        let id = sqlx::query(
            r#"
            INSERT INTO trade_sessions (
                ticker, strategy, origin, candidate_id, preset_id, preset_name, scan_date,
                status, current_step, instrument_json, version, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&ticker)
        .bind(new.strategy.as_str())
        .bind(new.origin.as_str())
        .bind(new.preset.map(|p| p.candidate_id))
        .bind(new.preset.map(|p| p.preset_id))
        .bind(new.preset.map(|p| p.preset_name.as_str()))
        .bind(new.preset.map(|p| p.scan_date.as_str()))
        .bind(SessionStatus::Draft.as_str())
        .bind(SessionStep::Checklist.as_str())
        .bind(instrument_json)
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await?
        .last_insert_rowid();

        tracing::info!(
            "Session #{} created for {} ({}, {})",
            id,
            ticker,
            new.strategy,
            new.origin
        );
        self.get_session(id).await
    }

    pub async fn get_session(&self, id: i64) -> EngineResult<TradeSession> {
        let mut conn = self.db.pool().acquire().await?;
        let row = Self::load_row(&mut conn, id).await?;
        let gates = Self::load_gates(&mut conn, id).await?;
        row.into_session(gates)
    }

    pub async fn update_checklist(
        &self,
        id: i64,
        banner: Banner,
        missing_count: i64,
        quality_score: i64,
    ) -> EngineResult<TradeSession> {
        let gate = GateResult::Checklist(ChecklistGate {
            banner,
            missing_count,
            quality_score,
            recorded_at: Utc::now(),
        });
        self.record(id, gate, None).await
    }

    pub async fn update_sizing(
        &self,
        id: i64,
        sizing: SizingInput,
        pyramid: Option<PyramidPlan>,
    ) -> EngineResult<TradeSession> {
        let gate = GateResult::Sizing(SizingGate {
            sizing,
            recorded_at: Utc::now(),
        });
        self.record(id, gate, pyramid.as_ref()).await
    }

    /// Record a heat verdict. A REJECT still advances the session to ENTRY.
    pub async fn update_heat(&self, id: i64, heat: HeatReading) -> EngineResult<TradeSession> {
        let gate = GateResult::Heat(HeatGate {
            heat,
            recorded_at: Utc::now(),
        });
        self.record(id, gate, None).await
    }

    /// Record the final GO / NO-GO and complete the session. A `decision_id` of
    /// zero or less means no decision was saved.
    pub async fn update_entry(
        &self,
        id: i64,
        decision: DecisionAction,
        decision_id: i64,
        gates: EntryGates,
    ) -> EngineResult<TradeSession> {
        let mut tx = self.db.begin().await?;
        Self::update_entry_in(&mut tx, id, decision, decision_id, gates).await?;
        tx.commit().await?;
        self.get_session(id).await
    }

    /// `update_entry` on a caller-supplied connection, so the Entry gate can
    /// commit together with the decision and the position it records.
    pub async fn update_entry_in(
        conn: &mut SqliteConnection,
        id: i64,
        decision: DecisionAction,
        decision_id: i64,
        gates: EntryGates,
    ) -> EngineResult<()> {
        let gate = GateResult::Entry(EntryGate {
            decision,
            decision_id: (decision_id > 0).then_some(decision_id),
            gates,
            recorded_at: Utc::now(),
        });
        Self::record_in(conn, id, &gate, None).await
    }

    async fn record(
        &self,
        id: i64,
        gate: GateResult,
        pyramid: Option<&PyramidPlan>,
    ) -> EngineResult<TradeSession> {
        let mut tx = self.db.begin().await?;
        Self::record_in(&mut tx, id, &gate, pyramid).await?;
        tx.commit().await?;
        self.get_session(id).await
    }

    async fn record_in(
        conn: &mut SqliteConnection,
        id: i64,
        gate: &GateResult,
        pyramid: Option<&PyramidPlan>,
    ) -> EngineResult<()> {
        let row = Self::load_row(&mut *conn, id).await?;
        Self::apply_gate(conn, &row, gate, pyramid).await
    }

    /// Write `gate` against a row read earlier. Fails with `Conflict` when the
    /// row's version moved on since it was read.
    pub(crate) async fn apply_gate(
        conn: &mut SqliteConnection,
        row: &SessionRow,
        gate: &GateResult,
        pyramid: Option<&PyramidPlan>,
    ) -> EngineResult<()> {
        let id = row.id;
        let step = gate.step();

        let status: SessionStatus = row.status.parse()?;
        let current: SessionStep = row.current_step.parse()?;
        if status != SessionStatus::Draft {
            return Err(EngineError::validation(format!(
                "session #{id} is {status}; only DRAFT sessions accept gate updates"
            )));
        }
        if current < step {
            return Err(EngineError::validation(format!(
                "session #{id} is at {current}; {step} is not reachable yet"
            )));
        }

        let next = if gate.passed() {
            current.max(step.next())
        } else {
            current
        };
        let recorded_at = gate.recorded_at();
        let (next_status, completed_at, decision_id) = match gate {
            GateResult::Entry(entry) => (SessionStatus::Completed, Some(recorded_at), entry.decision_id),
            _ => (SessionStatus::Draft, None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO session_gates (session_id, gate, payload, completed_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(session_id, gate) DO UPDATE SET
                payload = excluded.payload,
                completed_at = excluded.completed_at
            "#,
        )
        .bind(id)
        .bind(step.as_str())
        .bind(serde_json::to_string(gate)?)
        .bind(recorded_at)
        .execute(&mut *conn)
        .await?;

        let pyramid_json = pyramid.map(serde_json::to_string).transpose()?;
        let updated = sqlx::query(
            r#"
            UPDATE trade_sessions SET
                current_step = ?,
                status = ?,
                completed_at = COALESCE(?, completed_at),
                entry_decision_id = COALESCE(?, entry_decision_id),
                pyramid_json = COALESCE(?, pyramid_json),
                version = version + 1,
                updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(next.as_str())
        .bind(next_status.as_str())
        .bind(completed_at)
        .bind(decision_id)
        .bind(pyramid_json)
        .bind(Utc::now())
        .bind(id)
        .bind(row.version)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(EngineError::conflict(format!(
                "session #{id} was modified concurrently"
            )));
        }

        if next != current {
            tracing::info!("Session #{} {} -> {}", id, current, next);
        }
        if next_status == SessionStatus::Completed {
            tracing::info!("Session #{} completed", id);
        }
        Ok(())
    }

    /// Give up on a session. Abandoning twice is fine; abandoning a completed
    /// session is not.
    pub async fn abandon(&self, id: i64) -> EngineResult<TradeSession> {
        let mut tx = self.db.begin().await?;
        let row = Self::load_row(&mut tx, id).await?;

        match row.status.parse::<SessionStatus>()? {
            SessionStatus::Abandoned => {
                drop(tx);
                return self.get_session(id).await;
            }
            SessionStatus::Completed => {
                return Err(EngineError::validation(format!(
                    "session #{id} is already COMPLETED"
                )));
            }
            SessionStatus::Draft | SessionStatus::Evaluating => {}
        }

        let updated = sqlx::query(
            r#"
            UPDATE trade_sessions SET status = ?, version = version + 1, updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(SessionStatus::Abandoned.as_str())
        .bind(Utc::now())
        .bind(id)
        .bind(row.version)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(EngineError::conflict(format!(
                "session #{id} was modified concurrently"
            )));
        }
        tx.commit().await?;

        tracing::info!("Session #{} abandoned", id);
        self.get_session(id).await
    }

    /// Start over on the same ticker and strategy, keeping preset provenance.
    pub async fn clone_session(&self, id: i64) -> EngineResult<TradeSession> {
        let source = self.get_session(id).await?;
        let clone = match &source.preset {
            Some(preset) if source.origin == SessionOrigin::Preset => {
                self.create_session_from_preset(&source.ticker, source.strategy, preset)
                    .await?
            }
            _ => self.create_session(&source.ticker, source.strategy).await?,
        };

        tracing::debug!("Session #{} cloned from #{}", clone.id, id);
        Ok(clone)
    }

    /// DRAFT sessions, most recently touched first.
    pub async fn list_active(&self) -> EngineResult<Vec<TradeSession>> {
        self.list(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM trade_sessions WHERE status = 'DRAFT' ORDER BY updated_at DESC, id DESC"
            ),
            None,
        )
        .await
    }

    /// All sessions, newest first. A non-positive limit means the default of 100.
    pub async fn list_history(&self, limit: i64) -> EngineResult<Vec<TradeSession>> {
        let limit = if limit <= 0 { DEFAULT_HISTORY_LIMIT } else { limit };
        self.list(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM trade_sessions ORDER BY created_at DESC, id DESC LIMIT ?"
            ),
            Some(limit),
        )
        .await
    }

    async fn list(&self, sql: &str, limit: Option<i64>) -> EngineResult<Vec<TradeSession>> {
        let mut conn = self.db.pool().acquire().await?;
        let mut query = sqlx::query_as::<_, SessionRow>(sql);
        if let Some(limit) = limit {
            query = query.bind(limit);
        }
        let rows = query.fetch_all(&mut *conn).await?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            let gates = Self::load_gates(&mut conn, row.id).await?;
            sessions.push(row.into_session(gates)?);
        }
        Ok(sessions)
    }

    pub(crate) async fn load_row(conn: &mut SqliteConnection, id: i64) -> EngineResult<SessionRow> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM trade_sessions WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        row.ok_or_else(|| EngineError::not_found(format!("session #{id} not found")))
    }

    async fn load_gates(conn: &mut SqliteConnection, id: i64) -> EngineResult<GateResults> {
        let payloads: Vec<(String,)> =
            sqlx::query_as("SELECT payload FROM session_gates WHERE session_id = ?")
                .bind(id)
                .fetch_all(&mut *conn)
                .await?;

        let mut gates = GateResults::default();
        for (payload,) in payloads {
            gates.insert(serde_json::from_str(&payload)?);
        }
        Ok(gates)
    }
}
