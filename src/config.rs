use chrono::NaiveTime;

use crate::error::{AppError, Result};

pub const MARKTPLAATS_URL: &str = "https://www.marktplaats.nl";
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Scheduling loop tick (seconds). Granularity only; per-keyword intervals
/// are enforced by the throttle policy, not by the tick.
pub const TICK_INTERVAL_SECS: u64 = 30;

/// During the night window a keyword never runs more than once per hour.
pub const NIGHT_FLOOR_MINUTES: u32 = 60;

/// Hard cap on candidates considered per run.
pub const RESULT_LIMIT_MAX: usize = 20;

/// Marketplace search request timeout (seconds). A hung fetch must not
/// starve the keyword's future ticks.
pub const FETCH_TIMEOUT_SECS: u64 = 15;

/// Telegram request timeout (seconds).
pub const NOTIFY_TIMEOUT_SECS: u64 = 10;

/// Manual-trigger channel capacity.
pub const CHANNEL_CAPACITY: usize = 64;

/// Run records kept in memory for the /runs endpoint.
pub const RUN_LOG_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct Config {
    pub marketplace_url: String,
    pub telegram_api_url: String,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Scheduling loop tick override (TICK_SECS), mainly for local testing.
    pub tick_secs: u64,
    /// Search center postcode (POSTCODE); no location filter when unset.
    pub postcode: Option<String>,
    /// Search radius in km (RADIUS_KM); unbounded when unset.
    pub radius_km: Option<u32>,
    pub default_interval_minutes: u32,
    pub default_result_limit: usize,
    /// Night-mode master switch (NIGHT_MODE); keywords may override.
    pub night_mode: bool,
    pub night_start: NaiveTime,
    pub night_end: NaiveTime,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    /// Optional JSON file of keywords loaded once at startup (KEYWORDS_FILE).
    pub keywords_file: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            marketplace_url: std::env::var("MARKTPLAATS_URL")
                .unwrap_or_else(|_| MARKTPLAATS_URL.to_string()),
            telegram_api_url: std::env::var("TELEGRAM_API_URL")
                .unwrap_or_else(|_| TELEGRAM_API_URL.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "results.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            tick_secs: std::env::var("TICK_SECS")
                .unwrap_or_else(|_| TICK_INTERVAL_SECS.to_string())
                .parse::<u64>()
                .unwrap_or(TICK_INTERVAL_SECS),
            postcode: std::env::var("POSTCODE").ok().filter(|s| !s.trim().is_empty()),
            radius_km: std::env::var("RADIUS_KM")
                .ok()
                .and_then(|s| s.parse::<u32>().ok())
                .filter(|&r| r > 0),
            default_interval_minutes: std::env::var("DEFAULT_INTERVAL_MINUTES")
                .unwrap_or_else(|_| "15".to_string())
                .parse::<u32>()
                .unwrap_or(15)
                .max(1),
            default_result_limit: std::env::var("DEFAULT_RESULT_LIMIT")
                .unwrap_or_else(|_| "5".to_string())
                .parse::<usize>()
                .unwrap_or(5)
                .clamp(1, RESULT_LIMIT_MAX),
            night_mode: std::env::var("NIGHT_MODE")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            night_start: parse_hhmm(
                &std::env::var("NIGHT_START").unwrap_or_else(|_| "23:00".to_string()),
            )?,
            night_end: parse_hhmm(
                &std::env::var("NIGHT_END").unwrap_or_else(|_| "07:00".to_string()),
            )?,
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            telegram_chat_id: std::env::var("TELEGRAM_CHAT_ID")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            keywords_file: std::env::var("KEYWORDS_FILE").ok(),
        })
    }
}

fn parse_hhmm(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| AppError::Config(format!("invalid HH:MM time: {value:?}")))
}
