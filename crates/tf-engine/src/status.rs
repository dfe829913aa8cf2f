use engine_core::{EngineResult, SettingsProvider};
use serde::Serialize;
use trade_session::TradeWorkflow;

/// Point-in-time view of risk exposure, logged on every status tick
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub portfolio_heat: f64,
    pub portfolio_cap: f64,
    pub open_positions: usize,
    pub active_sessions: usize,
    pub cooldowns: Vec<String>,
}

impl StatusSnapshot {
    pub async fn collect(
        workflow: &TradeWorkflow,
        settings: &dyn SettingsProvider,
    ) -> EngineResult<Self> {
        let account = settings.account_settings().await?;
        let cooldowns = workflow
            .cooldowns()
            .list_active()
            .await?
            .into_iter()
            .map(|c| c.bucket)
            .collect();

        Ok(Self {
            portfolio_heat: workflow.risk().portfolio_heat().await?,
            portfolio_cap: account.portfolio_cap(),
            open_positions: workflow.ledger().open_positions().await?.len(),
            active_sessions: workflow.sessions().list_active().await?.len(),
            cooldowns,
        })
    }

    pub fn log(&self) {
        tracing::info!(
            "Heat ${:.2}/${:.2} | {} open positions | {} active sessions | cooldowns: {}",
            self.portfolio_heat,
            self.portfolio_cap,
            self.open_positions,
            self.active_sessions,
            if self.cooldowns.is_empty() {
                "none".to_string()
            } else {
                self.cooldowns.join(", ")
            }
        );
    }
}
