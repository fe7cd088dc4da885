//! Bot Configuration
//!
//! All configuration is read once from the environment at startup; there is
//! no runtime reconfiguration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::utils::error::{BotError, BotResult};

/// Process configuration, validated at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Chat platform bot credential
    #[serde(skip_serializing, default)]
    pub platform_token: String,
    /// Application id used for interaction follow-up replies
    pub application_id: String,
    /// Target community/guild identifier (0 = global commands)
    pub guild_id: u64,
    /// Spreadsheet identifier of the durable store
    pub sheet_id: String,
    /// Bearer token for the store API, or a path to a file holding one
    #[serde(skip_serializing, default)]
    pub store_token: String,
    /// Cadence of the results recomputation loop
    pub results_interval: Duration,
    /// TTL for cached Compiled-tab reads
    pub cache_ttl: Duration,
    /// Per-attempt timeout on store and platform calls
    pub request_timeout: Duration,
    /// Worker limit for startup revival
    pub revival_concurrency: usize,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            platform_token: String::new(),
            application_id: String::new(),
            guild_id: 0,
            sheet_id: String::new(),
            store_token: String::new(),
            results_interval: Duration::from_secs(45 * 60),
            cache_ttl: Duration::from_secs(45 * 60),
            request_timeout: Duration::from_secs(15),
            revival_concurrency: 4,
        }
    }
}

impl BotConfig {
    /// Load configuration from the environment.
    ///
    /// Required: `DISCORD_TOKEN`, `DISCORD_APPLICATION_ID`, `SHEET_ID`, and
    /// either `SHEETS_TOKEN` or `SHEETS_TOKEN_FILE`.
    /// Optional: `GUILD_ID`, `RESULTS_INTERVAL_MINS`, `CACHE_TTL_MINS`.
    pub fn from_env() -> BotResult<Self> {
        let required = |key: &str| {
            std::env::var(key)
                .map_err(|_| BotError::config(format!("{} environment variable not set", key)))
        };

        let store_token = match std::env::var("SHEETS_TOKEN") {
            Ok(token) => token,
            Err(_) => {
                let path = required("SHEETS_TOKEN_FILE")?;
                std::fs::read_to_string(&path)
                    .map(|s| s.trim().to_string())
                    .map_err(|e| BotError::config(format!("cannot read {}: {}", path, e)))?
            }
        };

        let minutes = |key: &str, default: u64| -> BotResult<Duration> {
            match std::env::var(key) {
                Ok(raw) => raw
                    .parse::<u64>()
                    .map(|m| Duration::from_secs(m * 60))
                    .map_err(|_| BotError::config(format!("{} must be an integer", key))),
                Err(_) => Ok(Duration::from_secs(default * 60)),
            }
        };

        let config = Self {
            platform_token: required("DISCORD_TOKEN")?,
            application_id: required("DISCORD_APPLICATION_ID")?,
            guild_id: std::env::var("GUILD_ID")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            sheet_id: required("SHEET_ID")?,
            store_token,
            results_interval: minutes("RESULTS_INTERVAL_MINS", 45)?,
            cache_ttl: minutes("CACHE_TTL_MINS", 45)?,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the rest of the process cannot run with
    pub fn validate(&self) -> BotResult<()> {
        if self.platform_token.is_empty() {
            return Err(BotError::config("platform token is empty"));
        }
        if self.sheet_id.is_empty() {
            return Err(BotError::config("sheet id is empty"));
        }
        if self.store_token.is_empty() {
            return Err(BotError::config("store token is empty"));
        }
        if self.results_interval < Duration::from_secs(60) {
            return Err(BotError::config("results interval below one minute"));
        }
        if self.revival_concurrency == 0 {
            return Err(BotError::config("revival concurrency must be at least 1"));
        }
        Ok(())
    }
}
