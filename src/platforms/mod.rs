use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::types::{ChatId, ChatMessage, MessageId, UserId};

pub mod telegram;

/// Trait defining the interface all platform connections must implement
#[async_trait]
pub trait PlatformConnection: Send + Sync {
    /// Connect to the platform and start receiving messages
    async fn connect(&mut self) -> Result<()>;

    /// Get the platform identifier (e.g., "telegram")
    fn platform_name(&self) -> &str;

    /// Check if the connection is healthy
    async fn is_connected(&self) -> bool;

    /// Get a receiver for incoming messages
    fn get_message_receiver(&self) -> Option<broadcast::Receiver<ChatMessage>>;

    /// Gracefully disconnect
    async fn disconnect(&mut self) -> Result<()>;
}

/// Moderation calls against the chat platform.
///
/// Every call may fail independently; callers log the error and carry on.
#[async_trait]
pub trait ModerationGateway: Send + Sync {
    /// Whether the user is an administrator or the creator of the chat
    async fn is_admin(&self, chat_id: ChatId, user_id: UserId) -> Result<bool>;

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()>;

    /// Delete several messages in one call.
    ///
    /// An error means nothing is known to be deleted. Success does not
    /// confirm every id: the platform may skip messages that are already gone.
    async fn delete_messages(&self, chat_id: ChatId, message_ids: &[MessageId]) -> Result<()>;

    /// Revoke (`allow_send = false`) or restore posting rights.
    /// `until` bounds a revocation on the platform side as well.
    async fn restrict(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        allow_send: bool,
        until: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Post a message, optionally as a reply, returning its id
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId>;

    async fn unpin_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()>;
}
