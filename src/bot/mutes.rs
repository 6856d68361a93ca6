// src/bot/mutes.rs - Mute registry with generation-guarded expiry reconciliation

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use crate::bot::clock::Clock;
use crate::platforms::ModerationGateway;
use crate::types::{MuteEntry, MuteKey};

// Far beyond any platform limit; keeps the chrono arithmetic in range
const MAX_MUTE_MINUTES: i64 = 1_000 * 365 * 24 * 60;

/// In-process record of which (chat, user) pairs are restricted and until when
pub struct MuteRegistry {
    entries: RwLock<HashMap<MuteKey, MuteEntry>>,
    next_generation: AtomicU64,
    /// Bumped, under the entries lock, each time a lift call returns
    lift_epoch: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl MuteRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            lift_epoch: AtomicU64::new(0),
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Expiry for a mute of `duration_minutes`; zero or absent means indefinite
    pub fn expiry_for(&self, duration_minutes: Option<u64>) -> Option<DateTime<Utc>> {
        match duration_minutes {
            Some(minutes) if minutes > 0 => {
                let minutes = i64::try_from(minutes).unwrap_or(i64::MAX).min(MAX_MUTE_MINUTES);
                self.clock
                    .now()
                    .checked_add_signed(chrono::Duration::minutes(minutes))
            }
            _ => None,
        }
    }

    /// Record a mute, replacing any existing one for the key
    pub async fn mute(&self, key: MuteKey, duration_minutes: Option<u64>) -> MuteEntry {
        let expires_at = self.expiry_for(duration_minutes);
        self.mute_until(key, expires_at).await
    }

    /// Record a mute with an already computed expiry
    pub async fn mute_until(&self, key: MuteKey, expires_at: Option<DateTime<Utc>>) -> MuteEntry {
        let entry = MuteEntry {
            key,
            expires_at,
            generation: self.next_generation.fetch_add(1, Ordering::SeqCst),
        };

        let previous = self.entries.write().await.insert(key, entry.clone());
        if let Some(previous) = previous {
            debug!("Mute {} generation {} replaced by {}", key, previous.generation, entry.generation);
        }

        match expires_at {
            Some(at) => info!("Muted {} until {}", key, at),
            None => info!("Muted {} indefinitely", key),
        }
        entry
    }

    /// Remove the mute for `key`. Returns whether one existed.
    pub async fn unmute(&self, key: MuteKey) -> bool {
        let removed = self.entries.write().await.remove(&key).is_some();
        if removed {
            info!("Unmuted {}", key);
        }
        removed
    }

    /// True while an entry exists and has not run past its expiry
    pub async fn is_muted(&self, key: MuteKey) -> bool {
        let now = self.clock.now();
        self.entries
            .read()
            .await
            .get(&key)
            .map(|entry| entry.is_active_at(now))
            .unwrap_or(false)
    }

    pub async fn get(&self, key: MuteKey) -> Option<MuteEntry> {
        self.entries.read().await.get(&key).cloned()
    }

    /// Remove the entry only if it is still the given generation
    pub async fn clear_if_generation(&self, key: MuteKey, generation: u64) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(&key) {
            Some(entry) if entry.generation == generation => {
                entries.remove(&key);
                true
            }
            _ => false,
        }
    }

    /// Number of lifts completed so far. A mute that sees this change across
    /// its own restrict call must restrict again.
    pub fn lift_epoch(&self) -> u64 {
        self.lift_epoch.load(Ordering::SeqCst)
    }

    /// Mark a lift call as returned and report any mute placed on `key`
    /// meanwhile, which the lift may have overridden at the platform
    pub async fn finish_lift(&self, key: MuteKey) -> Option<MuteEntry> {
        let now = self.clock.now();
        let entries = self.entries.write().await;
        self.lift_epoch.fetch_add(1, Ordering::SeqCst);
        entries.get(&key).filter(|entry| entry.is_active_at(now)).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Spawns one reconciliation task per timed mute
#[derive(Clone)]
pub struct ExpiryScheduler {
    registry: Arc<MuteRegistry>,
    gateway: Arc<dyn ModerationGateway>,
}

impl ExpiryScheduler {
    pub fn new(registry: Arc<MuteRegistry>, gateway: Arc<dyn ModerationGateway>) -> Self {
        Self { registry, gateway }
    }

    /// Arrange the lift of a timed mute. Indefinite mutes get no timer.
    pub fn schedule(&self, entry: &MuteEntry) -> Option<JoinHandle<()>> {
        let expires_at = entry.expires_at?;
        let delay = (expires_at - self.registry.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let key = entry.key;
        let generation = entry.generation;
        let scheduler = self.clone();

        debug!("Scheduled expiry of {} generation {} in {:?}", key, generation, delay);

        Some(tokio::spawn(async move {
            sleep(delay).await;
            scheduler.reconcile(key, generation).await;
        }))
    }

    /// Lift the mute if `generation` is still the live one.
    /// A re-mute or unmute since scheduling makes this a no-op.
    pub async fn reconcile(&self, key: MuteKey, generation: u64) -> bool {
        if !self.registry.clear_if_generation(key, generation).await {
            debug!("Expiry of {} generation {} is stale, ignoring", key, generation);
            return false;
        }

        info!("Mute {} expired", key);
        self.lift(key).await;
        true
    }

    /// Restore posting rights for a key already cleared from the registry.
    /// A mute recorded while the call was in flight is put back in force.
    pub async fn lift(&self, key: MuteKey) {
        if let Err(e) = self.gateway.restrict(key.chat_id, key.user_id, true, None).await {
            warn!("Failed to lift restriction on {}: {}", key, e);
        }

        if let Some(entry) = self.registry.finish_lift(key).await {
            info!("{} was muted again while being lifted, restoring generation {}", key, entry.generation);
            if let Err(e) = self
                .gateway
                .restrict(key.chat_id, key.user_id, false, entry.expires_at)
                .await
            {
                warn!("Failed to restore restriction on {}: {}", key, e);
            }
        }
    }
}
