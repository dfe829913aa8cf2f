use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal::unix::SignalKind;
use tokio::time;
use trade_session::TradeWorkflow;
use trade_store::{Database, SettingsStore};

mod config;
mod status;

use config::EngineConfig;
use status::StatusSnapshot;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
    }

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting TF trade-entry engine");

    // 2. Configuration
    let config = EngineConfig::from_env().context("invalid engine configuration")?;
    tracing::info!("  Database: {}", config.database_url);
    tracing::info!("  Settings cache TTL: {}s", config.settings_cache_ttl_seconds);
    tracing::info!("  Status interval: {}s", config.status_interval_seconds);

    // 3. Storage
    let fresh = !Database::exists(&config.database_url);
    let db = Database::connect(&config.database_url)
        .await
        .with_context(|| format!("failed to open {}", config.database_url))?;
    if fresh {
        tracing::info!("Created new database with default settings");
    }

    let settings = SettingsStore::with_ttl(db.clone(), config.settings_cache_ttl());
    let sweeper = settings.spawn_cache_sweeper(config.cache_sweep_interval());
    for (key, value) in settings.all_settings().await? {
        tracing::info!("  {} = {}", key, value);
    }

    let workflow = TradeWorkflow::new(db.clone(), Arc::new(settings.clone()));

    let recent = workflow
        .sessions()
        .list_history(config.history_limit)
        .await?;
    for session in &recent {
        tracing::info!(
            "  Session #{} {} {} {} ({})",
            session.id,
            session.ticker,
            session.strategy,
            session.status,
            session.current_step
        );
    }

    // 4. Status loop with graceful shutdown (SIGINT + SIGTERM)
    let mut interval = time::interval(config.status_interval());
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match StatusSnapshot::collect(&workflow, &settings).await {
                    Ok(snapshot) => snapshot.log(),
                    Err(e) => tracing::error!("Status snapshot failed: {}", e),
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    sweeper.abort();
    db.close().await;
    Ok(())
}
