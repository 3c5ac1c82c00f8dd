mod api;
mod config;
mod db;
mod dispatch;
mod error;
mod executor;
mod fetcher;
mod notifier;
mod scheduler;
mod state;
mod throttle;
mod types;

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::routes::{router, ApiState, KeywordDefaults};
use crate::config::{Config, CHANNEL_CAPACITY, RUN_LOG_CAPACITY};
use crate::db::ResultStore;
use crate::dispatch::DispatchCoordinator;
use crate::error::Result;
use crate::executor::SearchExecutor;
use crate::fetcher::MarktplaatsClient;
use crate::notifier::TelegramNotifier;
use crate::scheduler::{Scheduler, SchedulerState, SystemClock};
use crate::state::{KeywordRegistry, RunLog};
use crate::throttle::{NightPolicy, NightWindow};
use crate::types::{normalize_term, Keyword};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", cfg.db_path)).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    let store = ResultStore::new(pool);
    info!("Database ready at {}", cfg.db_path);

    // --- Keyword registry ---
    let registry = KeywordRegistry::new();
    if let Some(path) = &cfg.keywords_file {
        seed_keywords(&registry, path, &cfg);
    }
    info!("Registry loaded with {} keyword(s)", registry.len());

    // --- Collaborators ---
    let source = Arc::new(MarktplaatsClient::new(cfg.marketplace_url.clone())?);
    let notifier = Arc::new(TelegramNotifier::new(
        cfg.telegram_api_url.clone(),
        cfg.telegram_bot_token.clone(),
        cfg.telegram_chat_id.clone(),
    )?);
    if !notifier.is_configured() {
        warn!("Telegram not configured; new listings will only be logged");
    }

    let executor = Arc::new(SearchExecutor::new(
        source,
        cfg.postcode.clone(),
        cfg.radius_km,
    ));
    let dispatcher = Arc::new(DispatchCoordinator::new(store.clone(), notifier));

    // --- Scheduler ---
    let night = NightPolicy {
        enabled: cfg.night_mode,
        window: NightWindow {
            start: cfg.night_start,
            end: cfg.night_end,
        },
    };
    let scheduler_state = SchedulerState::new();
    let run_log = Arc::new(RunLog::new(RUN_LOG_CAPACITY));
    let (manual_tx, manual_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = Scheduler::new(
        Arc::clone(&registry),
        Arc::clone(&scheduler_state),
        executor,
        dispatcher,
        Arc::clone(&run_log),
        night,
        Arc::new(SystemClock),
        manual_rx,
        shutdown_rx,
        Duration::from_secs(cfg.tick_secs),
    );
    let scheduler_handle = tokio::spawn(scheduler.run());

    // --- HTTP API ---
    let api_state = ApiState {
        registry,
        scheduler: scheduler_state,
        run_log,
        store,
        manual_tx,
        night,
        defaults: KeywordDefaults {
            interval_minutes: cfg.default_interval_minutes,
            result_limit: cfg.default_result_limit,
        },
        health: HealthState::new(),
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the scheduler and let in-flight runs finish their store writes.
    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler_handle.await {
        warn!("Scheduler task ended abnormally: {e}");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        return;
    }
    info!("Shutdown signal received");
}

/// Read-only startup seed: the external configuration lives elsewhere, the
/// engine only consumes it. Invalid entries are skipped with a warning.
#[derive(Deserialize)]
struct KeywordSeed {
    term: String,
    interval_minutes: Option<u32>,
    min_price: Option<i64>,
    max_price: Option<i64>,
    result_limit: Option<usize>,
    night_mode: Option<bool>,
}

fn seed_keywords(registry: &KeywordRegistry, path: &str, cfg: &Config) {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Could not read keywords file {path}: {e}");
            return;
        }
    };
    let seeds: Vec<KeywordSeed> = match serde_json::from_str(&raw) {
        Ok(seeds) => seeds,
        Err(e) => {
            warn!("Could not parse keywords file {path}: {e}");
            return;
        }
    };
    for seed in seeds {
        let keyword = Keyword {
            id: normalize_term(&seed.term),
            term: seed.term.trim().to_string(),
            interval_minutes: seed
                .interval_minutes
                .unwrap_or(cfg.default_interval_minutes),
            min_price: seed.min_price,
            max_price: seed.max_price,
            result_limit: seed.result_limit.unwrap_or(cfg.default_result_limit),
            night_mode: seed.night_mode,
        };
        if let Err(e) = registry.upsert(keyword) {
            warn!("Skipping keyword from {path}: {e}");
        }
    }
}
