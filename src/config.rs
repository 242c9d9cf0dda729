//! Configuration loading and persistence.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. Built-in defaults (see [`crate::constants`])
//! 2. `config.json` in the config directory
//! 3. `ASSISTANT_STREAM_*` environment variables
//!
//! The binary applies command-line flags on top.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::fs;

use crate::constants::{
    DEFAULT_SERVER_URL, ERROR_NOTIFICATION_TTL, INFO_NOTIFICATION_TTL, MAX_RECONNECT_DELAY,
    RECONNECT_DELAY,
};

/// Name of the configuration file inside the config directory.
const CONFIG_FILE: &str = "config.json";

/// How the delay before each reconnect attempt is chosen.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectPolicy {
    /// Same delay before every attempt, retried forever.
    #[default]
    Fixed,
    /// Delay doubles per consecutive failure up to the configured cap.
    Exponential,
}

impl std::str::FromStr for ReconnectPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "exponential" => Ok(Self::Exponential),
            other => anyhow::bail!("unknown reconnect policy '{other}' (expected fixed or exponential)"),
        }
    }
}

/// Configuration for the streaming client.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the assistant server (`http://` or `https://`).
    pub server_url: String,
    /// Reconnect delay policy.
    pub reconnect_policy: ReconnectPolicy,
    /// Base reconnect delay in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Cap for the exponential policy in milliseconds.
    pub max_reconnect_delay_ms: u64,
    /// Display interval of informational notifications in milliseconds.
    pub info_notification_ms: u64,
    /// Display interval of error notifications in milliseconds.
    pub error_notification_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            reconnect_policy: ReconnectPolicy::Fixed,
            reconnect_delay_ms: duration_ms(RECONNECT_DELAY),
            max_reconnect_delay_ms: duration_ms(MAX_RECONNECT_DELAY),
            info_notification_ms: duration_ms(INFO_NOTIFICATION_TTL),
            error_notification_ms: duration_ms(ERROR_NOTIFICATION_TTL),
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Config {
    /// Returns the configuration directory path.
    ///
    /// `ASSISTANT_STREAM_CONFIG_DIR` overrides the platform config directory
    /// (macOS: ~/Library/Application Support/assistant-stream).
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("ASSISTANT_STREAM_CONFIG_DIR") {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join("assistant-stream"))
    }

    /// Loads configuration from the config directory, with environment overrides.
    ///
    /// A missing or unreadable file falls back to defaults.
    pub fn load() -> Result<Self> {
        Self::load_from_dir(&Self::config_dir()?)
    }

    /// Loads configuration from `dir`, with environment overrides.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let mut config = match Self::load_file(&dir.join(CONFIG_FILE)) {
            Ok(config) => config,
            Err(e) => {
                log::debug!("[Config] Using defaults: {:#}", e);
                Self::default()
            }
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Config file not found at {}", path.display());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(server_url) = std::env::var("ASSISTANT_STREAM_SERVER_URL") {
            self.server_url = server_url;
        }

        if let Ok(delay) = std::env::var("ASSISTANT_STREAM_RECONNECT_DELAY_MS") {
            self.reconnect_delay_ms = delay
                .parse()
                .with_context(|| format!("Invalid ASSISTANT_STREAM_RECONNECT_DELAY_MS '{delay}'"))?;
        }

        if let Ok(policy) = std::env::var("ASSISTANT_STREAM_RECONNECT_POLICY") {
            self.reconnect_policy = policy.parse()?;
        }

        Ok(())
    }

    /// Saves the configuration to the config directory.
    pub fn save(&self) -> Result<()> {
        self.save_to_dir(&Self::config_dir()?)
    }

    /// Saves the configuration to `dir`, creating it if necessary.
    pub fn save_to_dir(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        let content = serde_json::to_string_pretty(self)?;
        fs::write(dir.join(CONFIG_FILE), content)?;
        Ok(())
    }

    /// Set one key by name, as used by the `config` command.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "server_url" => self.server_url = value.to_string(),
            "reconnect_policy" => self.reconnect_policy = value.parse()?,
            "reconnect_delay_ms" => self.reconnect_delay_ms = value.parse()?,
            "max_reconnect_delay_ms" => self.max_reconnect_delay_ms = value.parse()?,
            "info_notification_ms" => self.info_notification_ms = value.parse()?,
            "error_notification_ms" => self.error_notification_ms = value.parse()?,
            other => anyhow::bail!("Unknown config key '{other}'"),
        }
        Ok(())
    }

    /// Delay before reconnect attempt number `attempt` (1-based).
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let base = Duration::from_millis(self.reconnect_delay_ms);
        match self.reconnect_policy {
            ReconnectPolicy::Fixed => base,
            ReconnectPolicy::Exponential => {
                let cap = Duration::from_millis(self.max_reconnect_delay_ms);
                let factor = 1u32 << attempt.saturating_sub(1).min(16);
                base.saturating_mul(factor).min(cap)
            }
        }
    }

    /// Display interval for informational notifications.
    pub fn info_notification_ttl(&self) -> Duration {
        Duration::from_millis(self.info_notification_ms)
    }

    /// Display interval for error notifications.
    pub fn error_notification_ttl(&self) -> Duration {
        Duration::from_millis(self.error_notification_ms)
    }
}
