// src/bot/deletion.rs - Reply-targeted and ranged message deletion

use log::{debug, info, warn};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use crate::config::DeletionConfig;
use crate::platforms::ModerationGateway;
use crate::types::{ChatId, DeletionRequest, MessageId, ModerationError, ModerationResult};

/// Deletes messages with a single bulk call, falling back to one call per message
pub struct DeletionExecutor {
    gateway: Arc<dyn ModerationGateway>,
    settings: DeletionConfig,
}

impl DeletionExecutor {
    pub fn new(gateway: Arc<dyn ModerationGateway>, settings: DeletionConfig) -> Self {
        Self { gateway, settings }
    }

    /// Validate a requested count and cap it at `max_count`
    pub fn clamp_count(&self, count: i64) -> ModerationResult<usize> {
        if count < 1 {
            return Err(ModerationError::InvalidCount {
                input: count.to_string(),
            });
        }
        let capped = count.min(self.settings.max_count);
        if capped < count {
            debug!("Deletion count {} capped to {}", count, capped);
        }
        Ok(usize::try_from(capped).unwrap_or(0))
    }

    /// Ids of the `count` messages preceding `anchor`, newest first
    pub fn range_ids(anchor: MessageId, count: usize) -> Vec<MessageId> {
        (1..=count as i64)
            .map(|offset| anchor - offset)
            .filter(|id| *id > 0)
            .collect()
    }

    /// Run a deletion request and return how many messages were removed.
    ///
    /// After a successful bulk call every id sent is counted, since the platform
    /// does not report the ones it skipped. The count never exceeds the ids sent.
    pub async fn execute(&self, chat_id: ChatId, request: DeletionRequest) -> ModerationResult<usize> {
        match request {
            DeletionRequest::ReplyTarget { message_id } => {
                Ok(usize::from(self.delete_one(chat_id, message_id).await))
            }
            DeletionRequest::Range { anchor, count } => {
                let count = self.clamp_count(count)?;
                let ids = Self::range_ids(anchor, count);
                Ok(self.delete_range(chat_id, &ids).await)
            }
        }
    }

    async fn delete_one(&self, chat_id: ChatId, message_id: MessageId) -> bool {
        match self.gateway.delete_message(chat_id, message_id).await {
            Ok(()) => true,
            Err(e) => {
                debug!("Could not delete message {} in {}: {}", message_id, chat_id, e);
                false
            }
        }
    }

    async fn delete_range(&self, chat_id: ChatId, ids: &[MessageId]) -> usize {
        if ids.is_empty() {
            return 0;
        }

        match self.gateway.delete_messages(chat_id, ids).await {
            Ok(()) => {
                info!("Bulk delete of {} messages in {} accepted", ids.len(), chat_id);
                return ids.len();
            }
            Err(e) => {
                warn!("Bulk delete of {} messages in {} failed, deleting one by one: {}", ids.len(), chat_id, e);
            }
        }

        let pace = Duration::from_millis(self.settings.pace_millis);
        let mut deleted = 0;
        for (i, id) in ids.iter().enumerate() {
            if i > 0 && !pace.is_zero() {
                sleep(pace).await;
            }
            if self.delete_one(chat_id, *id).await {
                deleted += 1;
            }
        }

        info!("Deleted {}/{} messages in {} individually", deleted, ids.len(), chat_id);
        deleted
    }
}
