// src/bot/spam.rs - Sliding-window flood limiter

use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

use crate::config::SpamConfig;
use crate::types::{MuteKey, SpamOutcome};

const MAX_WINDOW_SECONDS: i64 = 365 * 24 * 60 * 60;

/// Per-(chat, user) message timestamps inside the trailing window
pub struct SpamLimiter {
    settings: SpamConfig,
    windows: RwLock<HashMap<MuteKey, VecDeque<DateTime<Utc>>>>,
}

impl SpamLimiter {
    pub fn new(settings: SpamConfig) -> Self {
        Self {
            settings,
            windows: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &SpamConfig {
        &self.settings
    }

    fn window(&self) -> chrono::Duration {
        let seconds = i64::try_from(self.settings.window_seconds).unwrap_or(i64::MAX);
        chrono::Duration::seconds(seconds.min(MAX_WINDOW_SECONDS))
    }

    /// Count a message sent at `timestamp`.
    ///
    /// Going over the limit clears the key's window and reports `Triggered`;
    /// muting is left to the caller.
    pub async fn record(&self, key: MuteKey, timestamp: DateTime<Utc>) -> SpamOutcome {
        if !self.settings.enabled {
            return SpamOutcome::None;
        }

        let cutoff = timestamp - self.window();
        let mut windows = self.windows.write().await;
        let window = windows.entry(key).or_default();

        window.push_back(timestamp);
        window.retain(|ts| *ts > cutoff);

        if window.len() > self.settings.limit {
            warn!(
                "Flood from {}: {} messages within {}s (limit {})",
                key,
                window.len(),
                self.settings.window_seconds,
                self.settings.limit
            );
            windows.remove(&key);
            return SpamOutcome::Triggered;
        }

        debug!("{} has {} messages in window", key, window.len());
        SpamOutcome::None
    }

    /// Messages currently counted for `key`
    pub async fn window_len(&self, key: MuteKey) -> usize {
        self.windows.read().await.get(&key).map(|w| w.len()).unwrap_or(0)
    }

    /// Drop windows whose newest message has left the window
    pub async fn prune(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window();
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, w| w.back().map(|ts| *ts > cutoff).unwrap_or(false));
        before - windows.len()
    }
}
