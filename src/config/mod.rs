// src/config/mod.rs - Static moderation configuration (YAML file + environment)

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;

use crate::types::UserId;

/// Default file looked up when `MODERATION_CONFIG` is not set
pub const DEFAULT_CONFIG_FILE: &str = "moderation.yaml";

/// Most messages one bulk deletion may cover (the Bot API `deleteMessages` limit)
pub const MAX_DELETE_COUNT: i64 = 100;

/// Everything the moderation engine and bot read at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    /// Bot owner, treated as admin in every chat
    pub owner_id: Option<UserId>,
    pub filter: FilterConfig,
    pub spam: SpamConfig,
    pub deletion: DeletionConfig,
    pub cleanup: CleanupConfig,
}

/// Word filter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub active: bool,
    pub words: Vec<String>,
    pub bypass_admins: bool,
}

/// Flood limiter settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpamConfig {
    pub enabled: bool,
    /// Messages allowed inside the window; one more triggers a mute
    pub limit: usize,
    pub window_seconds: u64,
    pub mute_minutes: u64,
}

/// Bulk deletion settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeletionConfig {
    pub max_count: i64,
    pub default_count: i64,
    /// Pause between single deletes once the bulk call has failed
    pub pace_millis: u64,
}

/// Self-cleaning status message settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub delay_seconds: u64,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            owner_id: None,
            filter: FilterConfig::default(),
            spam: SpamConfig::default(),
            deletion: DeletionConfig::default(),
            cleanup: CleanupConfig::default(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            active: false,
            words: Vec::new(),
            bypass_admins: true,
        }
    }
}

impl Default for SpamConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: 5,
            window_seconds: 5,
            mute_minutes: 10,
        }
    }
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            max_count: 100,
            default_count: 10,
            pace_millis: 50,
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self { delay_seconds: 10 }
    }
}

impl ModerationConfig {
    /// Load `.env`, the YAML file named by `MODERATION_CONFIG` (if present),
    /// then apply environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let path = env::var("MODERATION_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let mut config = Self::from_yaml_file(&path)?;
        config.apply_env_overrides()?;
        config.validate()?;

        info!(
            "Loaded moderation config: filter {} ({} words), spam {} ({} msgs / {}s, mute {}m)",
            if config.filter.active { "on" } else { "off" },
            config.filter.words.len(),
            if config.spam.enabled { "on" } else { "off" },
            config.spam.limit,
            config.spam.window_seconds,
            config.spam.mute_minutes,
        );
        Ok(config)
    }

    /// Read a YAML file; a missing file yields the defaults
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;

        info!("Read moderation config from {}", path.display());
        Ok(config)
    }

    /// Override fields from environment variables that are set
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(owner) = env_parse::<UserId>("OWNER_ID")? {
            // 0 is how an unset owner is usually written in .env files
            self.owner_id = (owner != 0).then_some(owner);
        }
        if let Some(active) = env_flag("FILTER_ACTIVE")? {
            self.filter.active = active;
        }
        if let Ok(words) = env::var("FILTER_WORDS") {
            self.filter.words = words
                .split(',')
                .map(|w| w.trim().to_string())
                .filter(|w| !w.is_empty())
                .collect();
        }
        if let Some(bypass) = env_flag("FILTER_BYPASS_ADMINS")? {
            self.filter.bypass_admins = bypass;
        }
        if let Some(enabled) = env_flag("SPAM_ENABLED")? {
            self.spam.enabled = enabled;
        }
        if let Some(limit) = env_parse("SPAM_LIMIT")? {
            self.spam.limit = limit;
        }
        if let Some(window) = env_parse("SPAM_WINDOW_SECONDS")? {
            self.spam.window_seconds = window;
        }
        if let Some(minutes) = env_parse("SPAM_MUTE_MINUTES")? {
            self.spam.mute_minutes = minutes;
        }
        if let Some(delay) = env_parse("CLEANUP_DELAY_SECONDS")? {
            self.cleanup.delay_seconds = delay;
        }
        Ok(())
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.spam.enabled {
            if self.spam.limit == 0 {
                return Err(anyhow::anyhow!("spam.limit must be at least 1"));
            }
            if self.spam.window_seconds == 0 {
                return Err(anyhow::anyhow!("spam.window_seconds must be at least 1"));
            }
            if self.spam.mute_minutes == 0 {
                return Err(anyhow::anyhow!("spam.mute_minutes must be at least 1"));
            }
        }
        if !(1..=MAX_DELETE_COUNT).contains(&self.deletion.max_count) {
            return Err(anyhow::anyhow!(
                "deletion.max_count must be between 1 and {}",
                MAX_DELETE_COUNT
            ));
        }
        if self.deletion.default_count < 1 || self.deletion.default_count > self.deletion.max_count {
            return Err(anyhow::anyhow!(
                "deletion.default_count must be between 1 and {}",
                self.deletion.max_count
            ));
        }
        if self.filter.active && self.filter.words.iter().all(|w| w.trim().is_empty()) {
            warn!("Word filter is active but has no words");
        }
        Ok(())
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("{} has an invalid value: {}", name, raw)),
        _ => Ok(None),
    }
}

fn env_flag(name: &str) -> Result<Option<bool>> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "" => Ok(None),
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            other => Err(anyhow::anyhow!("{} must be a boolean, got '{}'", name, other)),
        },
        Err(_) => Ok(None),
    }
}
