//! # Group Chat Moderation Engine
//!
//! Keeps a group chat usable under abuse while the chat platform's API may
//! fail or rate-limit any individual call.
//!
//! ## Features
//!
//! - **Mutes with expiry**: timed and indefinite mutes, lifted by one
//!   generation-guarded timer per mute so a re-mute is never clobbered
//! - **Flood limiting**: sliding-window message counting per user that mutes
//!   on overflow before the message is interpreted any further
//! - **Bulk deletion**: one bulk call, falling back to paced single deletes
//! - **Self-cleaning replies**: status messages vanish after a short delay
//! - **Telegram transport**: long-polling Bot API client
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatwarden::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ModerationConfig::load()?;
//!     let api = Arc::new(TelegramApi::new(TelegramConfig::from_env()?));
//!
//!     let mut bot = ChatBot::new(api.clone(), &config);
//!     bot.add_connection(Box::new(TelegramConnection::new(api))).await;
//!     bot.start().await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     bot.shutdown().await
//! }
//! ```

pub mod bot;
pub mod config;
pub mod platforms;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used items
pub mod prelude {
    pub use crate::bot::engine::ModerationEngine;
    pub use crate::bot::ChatBot;
    pub use crate::config::ModerationConfig;
    pub use crate::platforms::{
        telegram::{TelegramApi, TelegramConfig, TelegramConnection},
        ModerationGateway, PlatformConnection,
    };
    pub use crate::types::{
        ChatMessage, DeletionRequest, ModerationError, MuteEntry, MuteKey, SpamOutcome,
    };
    pub use anyhow::Result;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
