#[cfg(test)]
mod session_engine_tests {
    use chrono::Utc;
    use engine_core::{
        Banner, DecisionAction, HeatStatus, SessionOrigin, SessionStatus, SessionStep,
        SizingMethod, Strategy,
    };
    use trade_store::{CandidateStore, Database};

    use crate::engine::TradeSessionEngine;
    use crate::models::*;

    async fn setup() -> (TradeSessionEngine, Database) {
        let db = Database::in_memory().await.unwrap();
        (TradeSessionEngine::new(db.clone()), db)
    }

    fn aapl_sizing() -> SizingInput {
        SizingInput {
            method: SizingMethod::Stock,
            entry: 180.0,
            atr: 1.5,
            stop_multiple: 2.0,
            stop_distance: 3.0,
            initial_stop: 177.0,
            shares: 25,
            contracts: 0,
            risk_dollars: 75.0,
            delta: 0.0,
        }
    }

    fn heat(status: HeatStatus) -> HeatReading {
        HeatReading {
            status,
            bucket: "Tech/Comm".to_string(),
            portfolio_current: 0.0,
            portfolio_new: 75.0,
            portfolio_cap: 400.0,
            bucket_current: 0.0,
            bucket_new: 75.0,
            bucket_cap: 150.0,
        }
    }

    #[tokio::test]
    async fn test_create_session() {
        let (engine, _) = setup().await;

        let session = engine
            .create_session(" aapl ", Strategy::LongBreakout)
            .await
            .unwrap();
        assert_eq!(session.ticker, "AAPL");
        assert_eq!(session.status, SessionStatus::Draft);
        assert_eq!(session.current_step, SessionStep::Checklist);
        assert_eq!(session.origin, SessionOrigin::Manual);
        assert_eq!(session.gates, GateResults::default());
        assert!(session.preset.is_none());

        let err = engine
            .create_session("  ", Strategy::Custom)
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_get_unknown_session() {
        let (engine, _) = setup().await;

        let err = engine.get_session(42).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_yellow_checklist_holds_step() {
        let (engine, _) = setup().await;
        let session = engine.create_session("AAPL", Strategy::LongBreakout).await.unwrap();

        let session = engine
            .update_checklist(session.id, Banner::Yellow, 1, 4)
            .await
            .unwrap();
        assert_eq!(session.current_step, SessionStep::Checklist);
        assert!(!session.gates.checklist_completed());
        let checklist = session.gates.checklist.as_ref().unwrap();
        assert_eq!(checklist.banner, Banner::Yellow);
        assert_eq!(checklist.missing_count, 1);

        let session = engine
            .update_checklist(session.id, Banner::Green, 0, 5)
            .await
            .unwrap();
        assert_eq!(session.current_step, SessionStep::Sizing);
        assert!(session.gates.checklist_completed());
    }

    #[tokio::test]
    async fn test_gates_must_be_reached_in_order() {
        let (engine, _) = setup().await;
        let session = engine.create_session("AAPL", Strategy::LongBreakout).await.unwrap();

        let err = engine
            .update_sizing(session.id, aapl_sizing(), None)
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = engine
            .update_heat(session.id, heat(HeatStatus::Ok))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = engine
            .update_entry(session.id, DecisionAction::NoGo, 0, EntryGates::default())
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let session = engine.get_session(session.id).await.unwrap();
        assert_eq!(session.current_step, SessionStep::Checklist);
        assert!(!session.gates.sizing_completed());
    }

    #[tokio::test]
    async fn test_step_never_moves_backwards() {
        let (engine, _) = setup().await;
        let id = engine
            .create_session("AAPL", Strategy::LongBreakout)
            .await
            .unwrap()
            .id;

        engine.update_checklist(id, Banner::Green, 0, 5).await.unwrap();
        engine.update_sizing(id, aapl_sizing(), None).await.unwrap();

        let session = engine.update_checklist(id, Banner::Red, 3, 1).await.unwrap();
        assert_eq!(session.current_step, SessionStep::Heat);
        assert!(!session.gates.checklist_completed());

        let mut resized = aapl_sizing();
        resized.shares = 20;
        resized.risk_dollars = 60.0;
        let session = engine.update_sizing(id, resized, None).await.unwrap();
        assert_eq!(session.current_step, SessionStep::Heat);
        assert_eq!(session.gates.sizing.unwrap().sizing.shares, 20);
    }

    #[tokio::test]
    async fn test_heat_reject_still_reaches_entry() {
        let (engine, _) = setup().await;
        let id = engine
            .create_session("AAPL", Strategy::LongBreakout)
            .await
            .unwrap()
            .id;
        engine.update_checklist(id, Banner::Green, 0, 5).await.unwrap();
        engine.update_sizing(id, aapl_sizing(), None).await.unwrap();

        let session = engine.update_heat(id, heat(HeatStatus::Reject)).await.unwrap();
        assert_eq!(session.current_step, SessionStep::Entry);
        assert!(session.gates.heat_completed());
        assert_eq!(
            session.gates.heat.unwrap().heat.status,
            HeatStatus::Reject
        );
    }

    #[tokio::test]
    async fn test_entry_completes_session() {
        let (engine, _) = setup().await;
        let id = engine
            .create_session("AAPL", Strategy::LongBreakout)
            .await
            .unwrap()
            .id;
        engine.update_checklist(id, Banner::Green, 0, 5).await.unwrap();
        engine.update_sizing(id, aapl_sizing(), None).await.unwrap();
        engine.update_heat(id, heat(HeatStatus::Ok)).await.unwrap();

        let session = engine
            .update_entry(id, DecisionAction::NoGo, 0, EntryGates::default())
            .await
            .unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.completed_at.is_some());
        assert!(session.entry_decision_id.is_none());
        let entry = session.gates.entry.unwrap();
        assert_eq!(entry.decision, DecisionAction::NoGo);
        assert_eq!(entry.decision_id, None);

        let err = engine
            .update_checklist(id, Banner::Green, 0, 5)
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_version_bumps_on_every_update() {
        let (engine, _) = setup().await;
        let created = engine.create_session("AAPL", Strategy::LongBreakout).await.unwrap();
        assert_eq!(created.version, 0);

        engine
            .update_checklist(created.id, Banner::Yellow, 1, 4)
            .await
            .unwrap();
        let session = engine
            .update_checklist(created.id, Banner::Green, 0, 5)
            .await
            .unwrap();
        assert_eq!(session.version, 2);
        assert!(session.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn test_stale_version_is_conflict() {
        let (engine, db) = setup().await;
        let created = engine.create_session("AAPL", Strategy::LongBreakout).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        let row = TradeSessionEngine::load_row(&mut tx, created.id).await.unwrap();
        sqlx::query("UPDATE trade_sessions SET version = version + 1 WHERE id = ?")
            .bind(created.id)
            .execute(&mut *tx)
            .await
            .unwrap();

        let gate = GateResult::Checklist(ChecklistGate {
            banner: Banner::Green,
            missing_count: 0,
            quality_score: 5,
            recorded_at: Utc::now(),
        });
        let err = TradeSessionEngine::apply_gate(&mut tx, &row, &gate, None)
            .await
            .unwrap_err();
        assert!(err.is_conflict(), "{err}");
        drop(tx);

        let session = engine.get_session(created.id).await.unwrap();
        assert_eq!(session.version, 0);
        assert_eq!(session.current_step, SessionStep::Checklist);
        assert!(session.gates.checklist.is_none());
    }

    #[tokio::test]
    async fn test_abandon() {
        let (engine, _) = setup().await;
        let id = engine
            .create_session("TSLA", Strategy::ShortBreakout)
            .await
            .unwrap()
            .id;

        let session = engine.abandon(id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Abandoned);
        let again = engine.abandon(id).await.unwrap();
        assert_eq!(again.status, SessionStatus::Abandoned);
        assert_eq!(again.version, session.version);

        let err = engine
            .update_checklist(id, Banner::Green, 0, 5)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(engine.abandon(999).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_completed_session_cannot_be_abandoned() {
        let (engine, _) = setup().await;
        let id = engine
            .create_session("AAPL", Strategy::LongBreakout)
            .await
            .unwrap()
            .id;
        engine.update_checklist(id, Banner::Green, 0, 5).await.unwrap();
        engine.update_sizing(id, aapl_sizing(), None).await.unwrap();
        engine.update_heat(id, heat(HeatStatus::Ok)).await.unwrap();
        engine
            .update_entry(id, DecisionAction::NoGo, -1, EntryGates::default())
            .await
            .unwrap();

        assert!(engine.abandon(id).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_clone_keeps_preset_provenance() {
        let (engine, db) = setup().await;
        let candidates = CandidateStore::new(db);
        let date = "2025-01-15";
        let preset_id = candidates
            .get_or_create_preset("TF_BREAKOUT_LONG", "v=211&f=ta_highlow52w_nh")
            .await
            .unwrap();
        candidates
            .import_candidates(date, &["NVDA".to_string()], Some(preset_id), None, Some("Tech/Comm"))
            .await
            .unwrap();
        let candidate = candidates.candidates_for_date(date).await.unwrap().remove(0);

        let link = PresetLink {
            candidate_id: candidate.id,
            preset_id,
            preset_name: "TF_BREAKOUT_LONG".to_string(),
            scan_date: date.to_string(),
        };
        let source = engine
            .create_session_from_preset("NVDA", Strategy::LongBreakout, &link)
            .await
            .unwrap();
        engine
            .update_checklist(source.id, Banner::Green, 0, 5)
            .await
            .unwrap();

        let clone = engine.clone_session(source.id).await.unwrap();
        assert_ne!(clone.id, source.id);
        assert_eq!(clone.ticker, "NVDA");
        assert_eq!(clone.origin, SessionOrigin::Preset);
        assert_eq!(clone.preset, Some(link));
        assert_eq!(clone.current_step, SessionStep::Checklist);
        assert_eq!(clone.gates, GateResults::default());
    }

    #[tokio::test]
    async fn test_clone_manual_session() {
        let (engine, _) = setup().await;
        let source = engine.create_session("AMD", Strategy::Custom).await.unwrap();
        engine.abandon(source.id).await.unwrap();

        let clone = engine.clone_session(source.id).await.unwrap();
        assert_eq!(clone.strategy, Strategy::Custom);
        assert_eq!(clone.origin, SessionOrigin::Manual);
        assert_eq!(clone.status, SessionStatus::Draft);
    }

    #[tokio::test]
    async fn test_instrument_and_pyramid_are_carried() {
        let (engine, _) = setup().await;
        let mut instrument = InstrumentMeta::stock();
        instrument.instrument_type = "OPTION".to_string();
        instrument.options_strategy = Some("BULL_CALL_SPREAD".to_string());
        instrument.dte = Some(45);

        let session = engine
            .create_session_with_instrument("SPY", Strategy::LongBreakout, &instrument)
            .await
            .unwrap();
        assert_eq!(session.instrument.as_ref(), Some(&instrument));

        engine
            .update_checklist(session.id, Banner::Green, 0, 5)
            .await
            .unwrap();
        let plan = PyramidPlan::van_tharp(180.0, 1.5, 0.5, 4).unwrap();
        let session = engine
            .update_sizing(session.id, aapl_sizing(), Some(plan.clone()))
            .await
            .unwrap();
        assert_eq!(session.pyramid, Some(plan));
        assert_eq!(session.instrument, Some(instrument));
    }

    #[tokio::test]
    async fn test_list_active_and_history() {
        let (engine, _) = setup().await;
        let a = engine.create_session("AAPL", Strategy::LongBreakout).await.unwrap();
        let b = engine.create_session("MSFT", Strategy::LongBreakout).await.unwrap();
        let c = engine.create_session("XOM", Strategy::LongBreakout).await.unwrap();

        engine.abandon(b.id).await.unwrap();
        engine.update_checklist(a.id, Banner::Yellow, 2, 3).await.unwrap();

        let active: Vec<i64> = engine
            .list_active()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(active, vec![a.id, c.id]);

        let history: Vec<i64> = engine
            .list_history(0)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(history, vec![c.id, b.id, a.id]);

        assert_eq!(engine.list_history(2).await.unwrap().len(), 2);
    }
}

#[cfg(test)]
mod workflow_tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use engine_core::{
        keys, trading_day, Banner, DecisionAction, HeatStatus, NewDecision, Outcome,
        PositionStatus, SessionStatus, SessionStep, SizingMethod, Strategy,
    };
    use position_ledger::PositionLedger;
    use risk_manager::ChecklistItems;
    use trade_store::{CandidateStore, Database, DecisionStore, SettingsStore};

    use crate::engine::TradeSessionEngine;
    use crate::models::{EntryGates, SizingInput};
    use crate::workflow::TradeWorkflow;

    struct Fixture {
        db: Database,
        workflow: TradeWorkflow,
        settings: SettingsStore,
        decisions: DecisionStore,
        candidates: CandidateStore,
    }

    async fn setup() -> Fixture {
        let db = Database::in_memory().await.unwrap();
        let settings = SettingsStore::new(db.clone());
        Fixture {
            workflow: TradeWorkflow::new(db.clone(), Arc::new(settings.clone())),
            decisions: DecisionStore::new(db.clone()),
            candidates: CandidateStore::new(db.clone()),
            settings,
            db,
        }
    }

    /// An OPEN position in `ticker` carried over from an earlier day.
    async fn carried_position(f: &Fixture, ticker: &str) {
        let mut old = NewDecision::no_go(ticker, Banner::Green, "");
        old.date = "2000-01-01".to_string();
        old.action = DecisionAction::Go;
        old.reason = None;
        let decision_id = f.decisions.save(&old).await.unwrap();

        sqlx::query(
            r#"
            INSERT INTO positions (
                ticker, entry_price, initial_stop, current_stop, shares,
                risk_dollars, bucket, status, decision_id, opened_at
            ) VALUES (?, 170.0, 165.0, 165.0, 10, 50.0, '', 'OPEN', ?, ?)
            "#,
        )
        .bind(ticker)
        .bind(decision_id)
        .bind(Utc::now())
        .execute(f.db.pool())
        .await
        .unwrap();
    }

    fn sizing(entry: f64, stop: f64, shares: i64) -> SizingInput {
        SizingInput {
            method: SizingMethod::Stock,
            entry,
            atr: (entry - stop) / 2.0,
            stop_multiple: 2.0,
            stop_distance: entry - stop,
            initial_stop: stop,
            shares,
            contracts: 0,
            risk_dollars: shares as f64 * (entry - stop),
            delta: 0.0,
        }
    }

    async fn through_heat(f: &Fixture, ticker: &str, input: SizingInput) -> i64 {
        let sessions = f.workflow.sessions();
        let id = sessions
            .create_session(ticker, Strategy::LongBreakout)
            .await
            .unwrap()
            .id;
        f.workflow
            .record_checklist(id, Banner::Green, 0, 5)
            .await
            .unwrap();
        f.workflow.record_sizing(id, input, None).await.unwrap();
        f.workflow.evaluate_heat(id).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_aapl_trade_end_to_end() {
        let f = setup().await;
        f.settings.set_setting(keys::EQUITY, "100000").await.unwrap();
        f.candidates
            .import_candidates(
                &trading_day(),
                &["AAPL".to_string(), "MSFT".to_string()],
                None,
                Some("Technology"),
                Some("Tech/Comm"),
            )
            .await
            .unwrap();

        let id = through_heat(&f, "AAPL", sizing(180.0, 177.0, 25)).await;
        let session = f.workflow.sessions().get_session(id).await.unwrap();
        assert_eq!(session.current_step, SessionStep::Entry);
        let heat = session.gates.heat.unwrap().heat;
        assert_eq!(heat.status, HeatStatus::Ok);
        assert_eq!(heat.bucket, "Tech/Comm");
        assert_eq!(heat.portfolio_cap, 4_000.0);
        assert_eq!(heat.bucket_cap, 1_500.0);
        assert!(f.workflow.brake().active_timer("AAPL").await.unwrap().is_some());

        let outcome = f
            .workflow
            .finalize_entry_at(id, DecisionAction::Go, Utc::now() + Duration::minutes(3))
            .await
            .unwrap();
        assert_eq!(outcome.session.status, SessionStatus::Completed);
        assert_eq!(outcome.session.entry_decision_id, Some(outcome.decision_id));
        assert!(outcome.session.gates.entry.unwrap().gates.all_passed());

        let decision = f.decisions.get(outcome.decision_id).await.unwrap();
        assert_eq!(decision.action, DecisionAction::Go);
        assert_eq!(decision.bucket.as_deref(), Some("Tech/Comm"));

        let position = outcome.position.unwrap();
        assert_eq!(position.entry_price, 180.0);
        assert_eq!(position.current_stop, 177.0);
        assert_eq!(position.shares, 25);
        assert_eq!(position.risk_dollars, 75.0);
        assert_eq!(position.bucket, "Tech/Comm");
        assert_eq!(position.decision_id, Some(outcome.decision_id));
        assert_eq!(f.workflow.risk().portfolio_heat().await.unwrap(), 75.0);
        assert_eq!(f.workflow.risk().bucket_heat("Tech/Comm").await.unwrap(), 75.0);

        let closed_at = Utc::now();
        let closed = f
            .workflow
            .ledger()
            .close_at("AAPL", 176.0, Outcome::Loss, closed_at)
            .await
            .unwrap();
        assert_eq!(closed.status, PositionStatus::Closed);
        assert_eq!(closed.pnl, Some(-100.0));
        assert_eq!(f.workflow.risk().portfolio_heat().await.unwrap(), 0.0);

        let cooldown = f
            .workflow
            .cooldowns()
            .get_at("Tech/Comm", closed_at)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            cooldown.expires_at.timestamp(),
            (closed_at + Duration::hours(24)).timestamp()
        );

        // The next trade in the same bucket is locked out.
        let next = through_heat(&f, "MSFT", sizing(400.0, 396.0, 10)).await;
        let err = f
            .workflow
            .finalize_entry_at(next, DecisionAction::Go, Utc::now() + Duration::minutes(3))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("bucket on cooldown"));
        let session = f.workflow.sessions().get_session(next).await.unwrap();
        assert_eq!(session.status, SessionStatus::Draft);
        assert_eq!(session.current_step, SessionStep::Entry);
    }

    #[tokio::test]
    async fn test_go_waits_for_impulse_brake() {
        let f = setup().await;
        let id = through_heat(&f, "AAPL", sizing(180.0, 177.0, 25)).await;

        let err = f
            .workflow
            .finalize_entry_at(id, DecisionAction::Go, Utc::now())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("impulse brake not elapsed"));
        assert!(!f.decisions.exists_for_date("AAPL", &trading_day()).await.unwrap());

        let outcome = f
            .workflow
            .finalize_entry(id, DecisionAction::NoGo)
            .await
            .unwrap();
        assert!(outcome.position.is_none());
        assert_eq!(outcome.session.status, SessionStatus::Completed);
        let entry = outcome.session.gates.entry.unwrap();
        assert!(!entry.gates.cooloff_elapsed);

        let decision = f.decisions.get(outcome.decision_id).await.unwrap();
        assert_eq!(decision.action, DecisionAction::NoGo);
        assert_eq!(decision.reason.as_deref(), Some("impulse brake not elapsed"));
        assert!(f.workflow.ledger().open_positions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_heat_reject_blocks_go() {
        let f = setup().await;
        f.candidates
            .import_candidates(&trading_day(), &["NVDA".to_string()], None, None, Some("Tech/Comm"))
            .await
            .unwrap();

        // 40 shares x $5 = $200 against a $150 bucket cap.
        let id = through_heat(&f, "NVDA", sizing(120.0, 115.0, 40)).await;
        let session = f.workflow.sessions().get_session(id).await.unwrap();
        assert_eq!(session.current_step, SessionStep::Entry);
        assert_eq!(session.gates.heat.unwrap().heat.status, HeatStatus::Reject);

        let err = f
            .workflow
            .finalize_entry_at(id, DecisionAction::Go, Utc::now() + Duration::minutes(3))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("heat cap exceeded"));
    }

    #[tokio::test]
    async fn test_unscreened_ticker_opens_without_bucket() {
        let f = setup().await;
        let id = through_heat(&f, "XYZ", sizing(50.0, 48.0, 10)).await;

        let outcome = f
            .workflow
            .finalize_entry_at(id, DecisionAction::Go, Utc::now() + Duration::minutes(3))
            .await
            .unwrap();
        let position = outcome.position.unwrap();
        assert_eq!(position.bucket, "");
        assert_eq!(position.risk_dollars, 20.0);

        f.workflow
            .ledger()
            .close("XYZ", 45.0, Outcome::Loss)
            .await
            .unwrap();
        assert!(f.workflow.cooldowns().list_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_entry_requires_entry_step() {
        let f = setup().await;
        let id = f
            .workflow
            .sessions()
            .create_session("AAPL", Strategy::LongBreakout)
            .await
            .unwrap()
            .id;
        f.workflow
            .record_checklist(id, Banner::Yellow, 2, 3)
            .await
            .unwrap();
        assert!(f.workflow.brake().active_timer("AAPL").await.unwrap().is_none());

        let err = f
            .workflow
            .finalize_entry(id, DecisionAction::NoGo)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        let err = f.workflow.evaluate_heat(id).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_go_refused_while_position_open() {
        let f = setup().await;
        carried_position(&f, "AAPL").await;
        let id = through_heat(&f, "AAPL", sizing(180.0, 177.0, 25)).await;

        let err = f
            .workflow
            .finalize_entry_at(id, DecisionAction::Go, Utc::now() + Duration::minutes(3))
            .await
            .unwrap_err();
        assert!(err.is_conflict(), "{err}");

        let session = f.workflow.sessions().get_session(id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Draft);
        assert_eq!(session.current_step, SessionStep::Entry);
        assert!(session.entry_decision_id.is_none());
        assert!(!f.decisions.exists_for_date("AAPL", &trading_day()).await.unwrap());
        assert_eq!(f.workflow.ledger().open_positions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_entry_writes_roll_back_together() {
        let f = setup().await;
        let id = through_heat(&f, "AAPL", sizing(180.0, 177.0, 25)).await;
        let gates = EntryGates {
            banner_green: true,
            cooloff_elapsed: true,
            not_on_cooldown: true,
            heat_ok: true,
            sizing_complete: true,
        };

        // The saved decision is NO-GO, so opening the position fails last.
        let mut tx = f.db.begin().await.unwrap();
        let decision_id =
            DecisionStore::save_in(&mut tx, &NewDecision::no_go("AAPL", Banner::Green, "test"))
                .await
                .unwrap();
        TradeSessionEngine::update_entry_in(&mut tx, id, DecisionAction::Go, decision_id, gates)
            .await
            .unwrap();
        let err = PositionLedger::open_in(&mut tx, "AAPL").await.unwrap_err();
        assert!(err.is_validation());
        drop(tx);

        let session = f.workflow.sessions().get_session(id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Draft);
        assert!(session.gates.entry.is_none());
        assert!(!f.decisions.exists_for_date("AAPL", &trading_day()).await.unwrap());
    }

    #[tokio::test]
    async fn test_checklist_items_and_atr_sizing() {
        let f = setup().await;
        f.candidates
            .import_candidates(&trading_day(), &["AAPL".to_string()], None, None, Some("Tech/Comm"))
            .await
            .unwrap();
        let id = f
            .workflow
            .sessions()
            .create_session("AAPL", Strategy::LongBreakout)
            .await
            .unwrap()
            .id;

        let items = ChecklistItems {
            tv_confirm: false,
            ..ChecklistItems::all_checked()
        };
        let session = f.workflow.record_checklist_items(id, &items, 4).await.unwrap();
        let checklist = session.gates.checklist.unwrap();
        assert_eq!(checklist.banner, Banner::Yellow);
        assert_eq!(checklist.missing_count, 1);
        assert_eq!(session.current_step, SessionStep::Checklist);
        assert!(f.workflow.brake().active_timer("AAPL").await.unwrap().is_none());

        let session = f
            .workflow
            .record_checklist_items(id, &ChecklistItems::all_checked(), 5)
            .await
            .unwrap();
        assert_eq!(session.current_step, SessionStep::Sizing);
        assert!(f.workflow.brake().active_timer("AAPL").await.unwrap().is_some());

        // Equity 10,000 at 0.75% with a 2 x ATR stop.
        let session = f.workflow.size_stock_entry(id, 180.0, 1.5, None).await.unwrap();
        let sized = session.gates.sizing.unwrap().sizing;
        assert_eq!(sized.method, SizingMethod::Stock);
        assert_eq!(sized.stop_multiple, 2.0);
        assert_eq!(sized.stop_distance, 3.0);
        assert_eq!(sized.initial_stop, 177.0);
        assert_eq!(sized.shares, 25);
        assert_eq!(sized.risk_dollars, 75.0);
        assert_eq!(session.current_step, SessionStep::Heat);

        f.workflow.evaluate_heat(id).await.unwrap();
        let outcome = f
            .workflow
            .finalize_entry_at(id, DecisionAction::Go, Utc::now() + Duration::minutes(3))
            .await
            .unwrap();
        let position = outcome.position.unwrap();
        assert_eq!(position.shares, 25);
        assert_eq!(position.risk_dollars, 75.0);
        assert_eq!(position.bucket, "Tech/Comm");
    }

    #[tokio::test]
    async fn test_atr_sizing_with_no_shares_is_rejected() {
        let f = setup().await;
        let id = f
            .workflow
            .sessions()
            .create_session("BRK.A", Strategy::LongBreakout)
            .await
            .unwrap()
            .id;
        f.workflow
            .record_checklist_items(id, &ChecklistItems::all_checked(), 5)
            .await
            .unwrap();

        // $75 budget against a $100 stop distance.
        let err = f
            .workflow
            .size_stock_entry(id, 600_000.0, 50.0, None)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        let session = f.workflow.sessions().get_session(id).await.unwrap();
        assert_eq!(session.current_step, SessionStep::Sizing);
    }
}
