// src/types/mod.rs - Core moderation types shared by the engine and the platforms

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Platform chat identifier (groups are negative on Telegram)
pub type ChatId = i64;
/// Platform user identifier
pub type UserId = i64;
/// Per-chat message identifier; older messages carry smaller ids
pub type MessageId = i64;

/// Kind of conversation a message arrived in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    /// Moderation only applies to group contexts
    pub fn is_group(&self) -> bool {
        matches!(self, ChatKind::Group | ChatKind::Supergroup)
    }
}

/// Author of a message as seen by the moderation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatUser {
    pub id: UserId,
    pub is_bot: bool,
    pub display_name: String,
}

/// The message a command replied to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyTarget {
    pub message_id: MessageId,
    pub author: Option<ChatUser>,
}

/// Inbound message flowing from a platform connection into the bot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub chat_id: ChatId,
    pub chat_kind: ChatKind,
    pub message_id: MessageId,
    pub sender: ChatUser,
    pub content: String,
    pub reply_to: Option<ReplyTarget>,
    pub timestamp: DateTime<Utc>,
}

/// Registry key: one mute per (chat, user) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MuteKey {
    pub chat_id: ChatId,
    pub user_id: UserId,
}

impl MuteKey {
    pub fn new(chat_id: ChatId, user_id: UserId) -> Self {
        Self { chat_id, user_id }
    }
}

impl fmt::Display for MuteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chat_id, self.user_id)
    }
}

/// A live mute as recorded by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuteEntry {
    pub key: MuteKey,
    /// `None` means the mute lasts until an explicit unmute
    pub expires_at: Option<DateTime<Utc>>,
    /// Distinguishes successive mutes on the same key
    pub generation: u64,
}

impl MuteEntry {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => expires_at > now,
        }
    }

    pub fn is_indefinite(&self) -> bool {
        self.expires_at.is_none()
    }
}

/// Result of running an inbound message through the flood limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpamOutcome {
    None,
    Triggered,
}

/// What a deletion command asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionRequest {
    /// Delete exactly the replied-to message
    ReplyTarget { message_id: MessageId },
    /// Delete up to `count` messages preceding `anchor` (the command message)
    Range { anchor: MessageId, count: i64 },
}

/// Rejections surfaced to the command layer before any state changes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModerationError {
    #[error("count must be a positive number, got '{input}'")]
    InvalidCount { input: String },

    #[error("duration must be a number of minutes, got '{input}'")]
    InvalidDuration { input: String },

    #[error("this command has to reply to a message")]
    MissingReplyTarget,

    #[error("only admins can use this command")]
    NotAuthorized,

    #[error("this command only works in groups")]
    NotGroupChat,
}

pub type ModerationResult<T> = Result<T, ModerationError>;
