use anyhow::{Context, Result};
use std::env;
use wheel_lib::service::EngineConfig;

#[derive(Clone)]
pub struct RuntimeConfig {
    pub db_path: String,

    pub initial_balance: i64,
    pub min_participants: u32,
    pub auto_start_delay_ms: u64,
    pub elimination_interval_ms: u64,
    pub winner_pct: u32,
    pub admin_pct: u32,
    pub app_pct: u32,

    pub sweep_period_secs: u64,
    pub event_buffer: usize,
    /// Allowed origin for the real-time channel; enforced by the transport.
    pub channel_origin: String,

    pub log_level: String,
    pub log_format: String,
    pub log_color: bool,
}

impl RuntimeConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            initial_balance: self.initial_balance,
            min_participants: self.min_participants,
            auto_start_delay_ms: self.auto_start_delay_ms,
            elimination_interval_ms: self.elimination_interval_ms,
            winner_pct: self.winner_pct,
            admin_pct: self.admin_pct,
            app_pct: self.app_pct,
        }
    }
}

pub fn load() -> Result<RuntimeConfig> {
    let _ = dotenvy::dotenv();

    let db_path = env_str("DB_PATH", None).context("DB_PATH must be set")?;

    let initial_balance = env_i64("INITIAL_BALANCE", None).context("INITIAL_BALANCE must be set")?;
    let min_participants =
        env_u32("MIN_PARTICIPANTS", None).context("MIN_PARTICIPANTS must be set")?;
    let auto_start_delay_ms =
        env_u64("AUTO_START_DELAY_MS", None).context("AUTO_START_DELAY_MS must be set")?;
    let elimination_interval_ms = env_u64("ELIMINATION_INTERVAL_MS", None)
        .context("ELIMINATION_INTERVAL_MS must be set")?;
    let winner_pct = env_u32("WINNER_PCT", None).context("WINNER_PCT must be set")?;
    let admin_pct = env_u32("ADMIN_PCT", None).context("ADMIN_PCT must be set")?;
    let app_pct = env_u32("APP_PCT", None).context("APP_PCT must be set")?;

    let sweep_period_secs = env_u64("SWEEP_PERIOD_SECS", Some(10)).unwrap_or(10);
    let event_buffer = env_usize("EVENT_BUFFER", Some(256)).unwrap_or(256);
    let channel_origin = env_str("CHANNEL_ORIGIN", Some("*".to_string())).unwrap_or_default();

    let log_level = env_str("LOG_LEVEL", Some("info".to_string())).unwrap_or_default();
    let log_format = env_str("LOG_FORMAT", Some("pretty".to_string())).unwrap_or_default();
    let log_color = env_bool("LOG_COLOR", Some(true)).unwrap_or(true);

    let cfg = RuntimeConfig {
        db_path,
        initial_balance,
        min_participants,
        auto_start_delay_ms,
        elimination_interval_ms,
        winner_pct,
        admin_pct,
        app_pct,
        sweep_period_secs,
        event_buffer,
        channel_origin,
        log_level,
        log_format,
        log_color,
    };

    cfg.engine_config()
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid engine configuration: {}", e))?;

    Ok(cfg)
}

fn env_str(key: &str, default: Option<String>) -> Option<String> {
    env::var(key).ok().or(default)
}

fn env_bool(key: &str, default: Option<bool>) -> Option<bool> {
    env::var(key).ok().and_then(|v| v.parse().ok()).or(default)
}

fn env_u64(key: &str, default: Option<u64>) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.parse().ok()).or(default)
}

fn env_u32(key: &str, default: Option<u32>) -> Option<u32> {
    env::var(key).ok().and_then(|v| v.parse().ok()).or(default)
}

fn env_i64(key: &str, default: Option<i64>) -> Option<i64> {
    env::var(key).ok().and_then(|v| v.parse().ok()).or(default)
}

fn env_usize(key: &str, default: Option<usize>) -> Option<usize> {
    env::var(key).ok().and_then(|v| v.parse().ok()).or(default)
}
