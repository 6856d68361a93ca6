use log::debug;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use crate::platforms::ModerationGateway;
use crate::types::{ChatId, MessageId};

/// Deletes bot status messages (and the commands that caused them) after a delay
#[derive(Clone)]
pub struct CleanupScheduler {
    gateway: Arc<dyn ModerationGateway>,
    default_delay: Duration,
}

impl CleanupScheduler {
    pub fn new(gateway: Arc<dyn ModerationGateway>, default_delay: Duration) -> Self {
        Self { gateway, default_delay }
    }

    pub fn default_delay(&self) -> Duration {
        self.default_delay
    }

    /// Spawn the deferred deletion and return immediately.
    /// Messages that are already gone are skipped silently.
    pub fn schedule(
        &self,
        chat_id: ChatId,
        message_ids: impl IntoIterator<Item = MessageId>,
        delay: Option<Duration>,
    ) -> JoinHandle<()> {
        let ids: BTreeSet<MessageId> = message_ids.into_iter().collect();
        let delay = delay.unwrap_or(self.default_delay);
        let gateway = Arc::clone(&self.gateway);

        tokio::spawn(async move {
            sleep(delay).await;
            for id in ids {
                if let Err(e) = gateway.delete_message(chat_id, id).await {
                    debug!("Status message {} in {} not deleted: {}", id, chat_id, e);
                }
            }
        })
    }
}
