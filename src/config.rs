use crate::api::telegram::TELEGRAM_API_BASE;
use crate::api::tinkoff::TINKOFF_API_BASE;
use crate::models::RecipientId;
use crate::strategy::StrategyConfig;
use anyhow::Context;
use chrono::{DateTime, Timelike, Utc};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "retestbot.toml";
const ENV_PREFIX: &str = "RETESTBOT";

// Most liquid MOEX shares
const DEFAULT_UNIVERSE: &[&str] = &[
    "SBER", "GAZP", "LKOH", "YNDX", "GMKN", "NVTK", "ROSN", "MTSS", "MGNT", "PLZL",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Settings {
    pub scanner: ScannerConfig,
    pub strategy: StrategyConfig,
    pub tinkoff: TinkoffConfig,
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScannerConfig {
    pub universe: Vec<String>,
    pub scan_interval_secs: u64,
    pub trading_hours: TradingHours,
    pub scan_lookback_days: i64,    // Hourly history per scan
    pub monitor_lookback_days: i64, // Minute history per monitoring pass
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            universe: DEFAULT_UNIVERSE.iter().map(|s| s.to_string()).collect(),
            scan_interval_secs: 300,
            trading_hours: TradingHours::default(),
            scan_lookback_days: 5,
            monitor_lookback_days: 1,
        }
    }
}

/// Inclusive UTC hour window during which the market is scanned
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TradingHours {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for TradingHours {
    fn default() -> Self {
        // 10:00-18:59 MSK
        Self {
            start_hour: 7,
            end_hour: 15,
        }
    }
}

impl TradingHours {
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        (self.start_hour..=self.end_hour).contains(&now.hour())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TinkoffConfig {
    pub token: String,
    pub base_url: String,
    pub request_interval_ms: u64,
}

impl Default for TinkoffConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            base_url: TINKOFF_API_BASE.to_string(),
            request_interval_ms: 500,
        }
    }
}

impl TinkoffConfig {
    pub fn request_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.request_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelegramConfig {
    pub token: String,
    pub base_url: String,
    pub chat_ids: Vec<RecipientId>, // Subscribed at startup
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            base_url: TELEGRAM_API_BASE.to_string(),
            chat_ids: Vec::new(),
            poll_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("broker token missing (set TINKOFF_TOKEN or RETESTBOT_TINKOFF__TOKEN)")]
    MissingBrokerToken,
    #[error("bot token missing (set TELEGRAM_BOT_TOKEN or RETESTBOT_TELEGRAM__TOKEN)")]
    MissingBotToken,
    #[error("scan universe is empty")]
    EmptyUniverse,
    #[error("trading hours {start}..={end} are not a valid UTC window")]
    InvalidTradingHours { start: u32, end: u32 },
    #[error("invalid setting: {0}")]
    InvalidValue(&'static str),
}

impl Settings {
    /// Load settings from defaults, an optional TOML file and the environment
    ///
    /// An explicit `path` must exist; otherwise `retestbot.toml` is read when
    /// present.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut settings = Self::build(path, None)?;
        settings.apply_legacy_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    fn build(path: Option<&Path>, env: Option<config::Map<String, String>>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("scanner.universe")
                    .with_list_parse_key("telegram.chat_ids")
                    .source(env),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Fill gaps from the plain variable names used by earlier deployments
    fn apply_legacy_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.tinkoff.token.is_empty() {
            if let Some(token) = lookup("TINKOFF_TOKEN") {
                self.tinkoff.token = token;
            }
        }
        if self.telegram.token.is_empty() {
            if let Some(token) = lookup("TELEGRAM_BOT_TOKEN") {
                self.telegram.token = token;
            }
        }
        if self.telegram.chat_ids.is_empty() {
            if let Some(ids) = lookup("TELEGRAM_CHAT_ID") {
                self.telegram.chat_ids = ids
                    .split(',')
                    .filter_map(|id| match id.trim().parse() {
                        Ok(id) => Some(id),
                        Err(_) => {
                            tracing::warn!("Ignoring invalid chat id {:?}", id);
                            None
                        }
                    })
                    .collect();
            }
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.tinkoff.token.trim().is_empty() {
            return Err(SettingsError::MissingBrokerToken);
        }
        if self.telegram.token.trim().is_empty() {
            return Err(SettingsError::MissingBotToken);
        }
        if self.scanner.universe.is_empty() {
            return Err(SettingsError::EmptyUniverse);
        }

        let hours = self.scanner.trading_hours;
        if hours.start_hour > hours.end_hour || hours.end_hour > 23 {
            return Err(SettingsError::InvalidTradingHours {
                start: hours.start_hour,
                end: hours.end_hour,
            });
        }

        if self.strategy.ema_period == 0 {
            return Err(SettingsError::InvalidValue("ema_period must be positive"));
        }
        if self.strategy.breakout_scan_depth == 0 {
            return Err(SettingsError::InvalidValue(
                "breakout_scan_depth must be positive",
            ));
        }
        if self.strategy.expiry_hours <= 0 {
            return Err(SettingsError::InvalidValue("expiry_hours must be positive"));
        }
        if self.tinkoff.request_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "tinkoff.request_interval_ms must be positive",
            ));
        }

        Ok(())
    }
}
