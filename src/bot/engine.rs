// src/bot/engine.rs - Moderation state engine: the typed operations the command layer calls

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::time::Duration;

use crate::bot::cleanup::CleanupScheduler;
use crate::bot::clock::{Clock, SystemClock};
use crate::bot::deletion::DeletionExecutor;
use crate::bot::mutes::{ExpiryScheduler, MuteRegistry};
use crate::bot::spam::SpamLimiter;
use crate::config::ModerationConfig;
use crate::platforms::ModerationGateway;
use crate::types::{
    ChatId, DeletionRequest, MessageId, ModerationResult, MuteEntry, MuteKey, SpamOutcome, UserId,
};

pub struct ModerationEngine {
    gateway: Arc<dyn ModerationGateway>,
    owner_id: Option<UserId>,
    registry: Arc<MuteRegistry>,
    expiry: ExpiryScheduler,
    limiter: SpamLimiter,
    deletion: DeletionExecutor,
    cleanup: CleanupScheduler,
}

impl ModerationEngine {
    pub fn new(gateway: Arc<dyn ModerationGateway>, config: &ModerationConfig) -> Self {
        Self::with_clock(gateway, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        gateway: Arc<dyn ModerationGateway>,
        config: &ModerationConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let registry = Arc::new(MuteRegistry::new(clock));
        Self {
            expiry: ExpiryScheduler::new(Arc::clone(&registry), Arc::clone(&gateway)),
            limiter: SpamLimiter::new(config.spam),
            deletion: DeletionExecutor::new(Arc::clone(&gateway), config.deletion),
            cleanup: CleanupScheduler::new(
                Arc::clone(&gateway),
                Duration::from_secs(config.cleanup.delay_seconds),
            ),
            owner_id: config.owner_id,
            registry,
            gateway,
        }
    }

    pub fn gateway(&self) -> &Arc<dyn ModerationGateway> {
        &self.gateway
    }

    pub fn registry(&self) -> &Arc<MuteRegistry> {
        &self.registry
    }

    pub fn limiter(&self) -> &SpamLimiter {
        &self.limiter
    }

    /// Owner or chat administrator. Lookup failures count as "no".
    pub async fn is_admin(&self, chat_id: ChatId, user_id: UserId) -> bool {
        if self.owner_id == Some(user_id) {
            return true;
        }
        match self.gateway.is_admin(chat_id, user_id).await {
            Ok(is_admin) => is_admin,
            Err(e) => {
                warn!("Admin lookup for {} in {} failed: {}", user_id, chat_id, e);
                false
            }
        }
    }

    /// Feed a message through the flood limiter. Runs before any command
    /// handling; a `Triggered` sender is already muted when this returns.
    pub async fn handle_inbound_message(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        is_group: bool,
        message_id: MessageId,
        timestamp: DateTime<Utc>,
    ) -> SpamOutcome {
        if !is_group {
            return SpamOutcome::None;
        }

        let key = MuteKey::new(chat_id, user_id);
        match self.limiter.record(key, timestamp).await {
            SpamOutcome::None => SpamOutcome::None,
            SpamOutcome::Triggered => {
                info!("Message {} pushed {} over the flood limit", message_id, key);
                let minutes = self.limiter.settings().mute_minutes;
                self.request_mute(chat_id, user_id, Some(minutes)).await;
                SpamOutcome::Triggered
            }
        }
    }

    /// Restrict at the platform, then record the mute and arm its expiry.
    /// The registry is updated even if the platform call fails.
    pub async fn request_mute(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        duration_minutes: Option<u64>,
    ) -> MuteEntry {
        let key = MuteKey::new(chat_id, user_id);
        let expires_at = self.registry.expiry_for(duration_minutes);
        let lifts_before = self.registry.lift_epoch();

        if let Err(e) = self.gateway.restrict(chat_id, user_id, false, expires_at).await {
            warn!("Failed to restrict {}: {}", key, e);
        }

        let entry = self.registry.mute_until(key, expires_at).await;

        // A lift that returned meanwhile may have landed after our restriction
        if self.registry.lift_epoch() != lifts_before {
            debug!("Lift raced with mute of {}, restricting again", key);
            if let Err(e) = self.gateway.restrict(chat_id, user_id, false, expires_at).await {
                warn!("Failed to restrict {}: {}", key, e);
            }
        }

        self.expiry.schedule(&entry);
        entry
    }

    /// Returns false (and touches nothing) if the user was not muted
    pub async fn request_unmute(&self, chat_id: ChatId, user_id: UserId) -> bool {
        let key = MuteKey::new(chat_id, user_id);
        if !self.registry.unmute(key).await {
            debug!("Unmute of {} ignored, not muted", key);
            return false;
        }

        self.expiry.lift(key).await;
        true
    }

    pub async fn is_muted(&self, chat_id: ChatId, user_id: UserId) -> bool {
        self.registry.is_muted(MuteKey::new(chat_id, user_id)).await
    }

    /// Authorization is the caller's job
    pub async fn request_deletion(
        &self,
        chat_id: ChatId,
        request: DeletionRequest,
    ) -> ModerationResult<usize> {
        self.deletion.execute(chat_id, request).await
    }

    /// Fire-and-forget deletion of status messages after `delay`
    /// (the configured default when `None`)
    pub fn schedule_cleanup(
        &self,
        chat_id: ChatId,
        message_ids: impl IntoIterator<Item = MessageId>,
        delay: Option<Duration>,
    ) {
        self.cleanup.schedule(chat_id, message_ids, delay);
    }

    /// Forget flood windows nobody has posted into recently
    pub async fn prune_idle_windows(&self) -> usize {
        let pruned = self.limiter.prune(self.registry.now()).await;
        if pruned > 0 {
            debug!("Pruned {} idle flood windows", pruned);
        }
        pruned
    }
}
