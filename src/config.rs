use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Bot API token. The TELEGRAM_BOT_TOKEN environment variable wins
    /// over the file, so the secret can stay out of it.
    pub telegram_bot_token: Option<String>,

    #[serde(default = "default_user_agent")]
    pub reddit_user_agent: String,

    /// How often the watcher re-reads the watchlist, in seconds.
    #[serde(default = "default_watchlist_refresh")]
    pub watchlist_refresh_secs: u64,

    /// Pause between stream polls when nothing new came back.
    #[serde(default = "default_stream_pause")]
    pub stream_pause_secs: u64,

    /// How often the delivery loop drains undelivered events.
    #[serde(default = "default_delivery_interval")]
    pub delivery_interval_secs: u64,

    /// Back-off after an upstream error in a stream worker.
    #[serde(default = "default_upstream_cooldown")]
    pub upstream_cooldown_secs: u64,

    /// Back-off after a failed event commit.
    #[serde(default = "default_error_cooldown")]
    pub error_cooldown_secs: u64,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reddit-watcher");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("watcher.db").to_string_lossy().to_string()
}

fn default_user_agent() -> String {
    format!("reddit-watcher/{}", env!("CARGO_PKG_VERSION"))
}

fn default_watchlist_refresh() -> u64 {
    10
}

fn default_stream_pause() -> u64 {
    1
}

fn default_delivery_interval() -> u64 {
    5
}

fn default_upstream_cooldown() -> u64 {
    30
}

fn default_error_cooldown() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            telegram_bot_token: None,
            reddit_user_agent: default_user_agent(),
            watchlist_refresh_secs: default_watchlist_refresh(),
            stream_pause_secs: default_stream_pause(),
            delivery_interval_secs: default_delivery_interval(),
            upstream_cooldown_secs: default_upstream_cooldown(),
            error_cooldown_secs: default_error_cooldown(),
        }
    }
}

impl Config {
    /// Load from the default location, writing a default file on first run.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            toml::from_str(&content)?
        } else {
            let config = Config::default();
            config.save_to(config_path)?;
            config
        };

        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            if !token.is_empty() {
                config.telegram_bot_token = Some(token);
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("reddit-watcher")
            .join("config.toml")
    }
}
