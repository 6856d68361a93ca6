// src/bot/handler.rs - Per-message pipeline: flood check, commands, word filter

use anyhow::Result;
use log::{debug, info, warn};
use std::sync::Arc;

use crate::bot::commands::{self, ModerationCommand};
use crate::bot::engine::ModerationEngine;
use crate::bot::filter::WordFilter;
use crate::types::{ChatMessage, DeletionRequest, MessageId, ModerationError, SpamOutcome};

const FLOOD_WARNING: &str = "Slow down! You have been muted for flooding the chat.";
const FILTER_WARNING: &str = "Your message contained a blocked word and was removed.";
const CLEARING: &str = "Clearing messages...";
const UNPIN_FAILED: &str = "Could not unpin that message (the bot may lack the rights).";

/// Runs every inbound message through the moderation pipeline
#[derive(Clone)]
pub struct MessageHandler {
    engine: Arc<ModerationEngine>,
    filter: Arc<WordFilter>,
    default_clear_count: i64,
}

impl MessageHandler {
    pub fn new(engine: Arc<ModerationEngine>, filter: WordFilter, default_clear_count: i64) -> Self {
        Self {
            engine,
            filter: Arc::new(filter),
            default_clear_count,
        }
    }

    pub fn engine(&self) -> &Arc<ModerationEngine> {
        &self.engine
    }

    pub async fn process_message(&self, message: &ChatMessage) -> Result<()> {
        if message.sender.is_bot {
            return Ok(());
        }

        let in_group = message.chat_kind.is_group();
        let outcome = self
            .engine
            .handle_inbound_message(
                message.chat_id,
                message.sender.id,
                in_group,
                message.message_id,
                message.timestamp,
            )
            .await;

        if outcome == SpamOutcome::Triggered {
            self.punish_flood(message).await;
            return Ok(());
        }

        let text = message.content.trim();
        if text.is_empty() {
            return Ok(());
        }

        match commands::parse_command(text) {
            Some(command) => {
                debug!("{} command from {} in {}", command.name(), message.sender.id, message.chat_id);
                if let Err(rejection) = self.run_command(message, command).await {
                    self.reject(message, rejection).await;
                }
            }
            None if in_group => self.apply_word_filter(message).await,
            None => {}
        }
        Ok(())
    }

    async fn punish_flood(&self, message: &ChatMessage) {
        let gateway = self.engine.gateway();
        if let Err(e) = gateway.delete_message(message.chat_id, message.message_id).await {
            warn!("Failed to delete flood message {} in {}: {}", message.message_id, message.chat_id, e);
        }
        self.reply_ephemeral(message, FLOOD_WARNING, None).await;
    }

    async fn run_command(&self, message: &ChatMessage, command: ModerationCommand) -> Result<(), ModerationError> {
        if !message.chat_kind.is_group() {
            return Err(ModerationError::NotGroupChat);
        }

        // Reply target is checked before authorization
        if !matches!(command, ModerationCommand::Clear { .. }) && message.reply_to.is_none() {
            return Err(ModerationError::MissingReplyTarget);
        }

        if !self.engine.is_admin(message.chat_id, message.sender.id).await {
            info!("{} denied {} in {}", message.sender.id, command.name(), message.chat_id);
            return Err(ModerationError::NotAuthorized);
        }

        match command {
            ModerationCommand::Clear { count } => self.clear(message, count.as_deref()).await,
            ModerationCommand::Mute { minutes } => self.mute(message, minutes.as_deref()).await,
            ModerationCommand::Unmute => self.unmute(message).await,
            ModerationCommand::Unpin => self.unpin(message).await,
        }
    }

    async fn clear(&self, message: &ChatMessage, count: Option<&str>) -> Result<(), ModerationError> {
        let request = match &message.reply_to {
            Some(target) => DeletionRequest::ReplyTarget {
                message_id: target.message_id,
            },
            None => DeletionRequest::Range {
                anchor: message.message_id,
                count: commands::parse_count(count, self.default_clear_count)?,
            },
        };

        if let DeletionRequest::Range { count, .. } = request {
            if count < 1 {
                return Err(ModerationError::InvalidCount {
                    input: count.to_string(),
                });
            }
        }

        let status = self.send(message, CLEARING, Some(message.message_id)).await;
        let deleted = self.engine.request_deletion(message.chat_id, request).await?;
        info!("Cleared {} messages in {} for {}", deleted, message.chat_id, message.sender.id);

        let summary = self.send(message, &format!("Done. Messages deleted: {}", deleted), None).await;
        self.engine.schedule_cleanup(
            message.chat_id,
            [status, summary, Some(message.message_id)].into_iter().flatten(),
            None,
        );
        Ok(())
    }

    async fn mute(&self, message: &ChatMessage, minutes: Option<&str>) -> Result<(), ModerationError> {
        let target = message
            .reply_to
            .as_ref()
            .and_then(|r| r.author.clone())
            .ok_or(ModerationError::MissingReplyTarget)?;
        let minutes = commands::parse_minutes(minutes)?;

        self.engine.request_mute(message.chat_id, target.id, minutes).await;

        let text = match minutes {
            Some(m) => format!("{} has been muted for {} minutes.", target.display_name, m),
            None => format!("{} has been muted.", target.display_name),
        };
        self.reply_ephemeral(message, &text, Some(message.message_id)).await;
        Ok(())
    }

    async fn unmute(&self, message: &ChatMessage) -> Result<(), ModerationError> {
        let target = message
            .reply_to
            .as_ref()
            .and_then(|r| r.author.clone())
            .ok_or(ModerationError::MissingReplyTarget)?;

        let text = if self.engine.request_unmute(message.chat_id, target.id).await {
            format!("{} can talk again.", target.display_name)
        } else {
            format!("{} was not muted.", target.display_name)
        };
        self.reply_ephemeral(message, &text, Some(message.message_id)).await;
        Ok(())
    }

    async fn unpin(&self, message: &ChatMessage) -> Result<(), ModerationError> {
        let target = message
            .reply_to
            .as_ref()
            .ok_or(ModerationError::MissingReplyTarget)?;

        match self.engine.gateway().unpin_message(message.chat_id, target.message_id).await {
            Ok(()) => {
                info!("Unpinned {} in {}", target.message_id, message.chat_id);
                self.reply_ephemeral(message, "Message unpinned.", Some(message.message_id)).await;
            }
            Err(e) => {
                warn!("Failed to unpin {} in {}: {}", target.message_id, message.chat_id, e);
                self.send(message, UNPIN_FAILED, Some(message.message_id)).await;
            }
        }
        Ok(())
    }

    async fn apply_word_filter(&self, message: &ChatMessage) {
        if !self.filter.matches(&message.content) {
            return;
        }
        if self.filter.bypass_admins() && self.engine.is_admin(message.chat_id, message.sender.id).await {
            debug!("Filtered word from admin {} allowed", message.sender.id);
            return;
        }

        info!("Removing filtered message {} from {} in {}", message.message_id, message.sender.id, message.chat_id);
        let gateway = self.engine.gateway();
        if let Err(e) = gateway.delete_message(message.chat_id, message.message_id).await {
            warn!("Failed to delete filtered message {}: {}", message.message_id, e);
        }

        if let Some(warning) = self.send(message, FILTER_WARNING, None).await {
            self.engine.schedule_cleanup(message.chat_id, [warning], None);
        }
    }

    async fn reject(&self, message: &ChatMessage, rejection: ModerationError) {
        debug!("Rejected command from {} in {}: {}", message.sender.id, message.chat_id, rejection);
        self.reply_ephemeral(message, &rejection.to_string(), Some(message.message_id)).await;
    }

    /// Send `text` and clean it up, together with the command message, later
    async fn reply_ephemeral(&self, message: &ChatMessage, text: &str, reply_to: Option<MessageId>) {
        let sent = self.send(message, text, reply_to).await;
        let mut ids = vec![message.message_id];
        ids.extend(sent);
        self.engine.schedule_cleanup(message.chat_id, ids, None);
    }

    async fn send(&self, message: &ChatMessage, text: &str, reply_to: Option<MessageId>) -> Option<MessageId> {
        match self.engine.gateway().send_message(message.chat_id, text, reply_to).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Failed to send message to {}: {}", message.chat_id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::clock::MonotonicClock;
    use crate::config::{FilterConfig, ModerationConfig};
    use crate::testing::{group_message, replying_to, GatewayCall, RecordingGateway};
    use crate::types::ChatKind;
    use tokio::time::{sleep, Duration};

    const CHAT: i64 = -1001;
    const ADMIN: i64 = 1;
    const MEMBER: i64 = 2;

    fn handler(gateway: &Arc<RecordingGateway>, config: ModerationConfig) -> MessageHandler {
        gateway.add_admin(CHAT, ADMIN);
        let engine = Arc::new(ModerationEngine::with_clock(
            gateway.clone(),
            &config,
            Arc::new(MonotonicClock::new()),
        ));
        MessageHandler::new(
            engine,
            WordFilter::from_config(&config.filter),
            config.deletion.default_count,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_admin_mutes_by_reply() {
        let gateway = Arc::new(RecordingGateway::new());
        let handler = handler(&gateway, ModerationConfig::default());

        let command = replying_to(group_message(CHAT, ADMIN, 50, "سکوت ۵"), 49, MEMBER);
        handler.process_message(&command).await.unwrap();

        assert!(handler.engine().is_muted(CHAT, MEMBER).await);
        assert!(gateway.sent_texts()[0].contains("muted for 5 minutes"));

        // Status reply and the command itself disappear after the cleanup delay
        sleep(Duration::from_secs(11)).await;
        let deleted = gateway.deleted();
        assert!(deleted.contains(&50));
        assert_eq!(deleted.len(), 2);

        sleep(Duration::from_secs(5 * 60)).await;
        assert!(!handler.engine().is_muted(CHAT, MEMBER).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_member_cannot_mute() {
        let gateway = Arc::new(RecordingGateway::new());
        let handler = handler(&gateway, ModerationConfig::default());

        let command = replying_to(group_message(CHAT, MEMBER, 50, "/mute 10"), 49, ADMIN);
        handler.process_message(&command).await.unwrap();

        assert!(!handler.engine().is_muted(CHAT, ADMIN).await);
        assert!(gateway.restrictions().is_empty());
        assert_eq!(gateway.sent_texts(), vec![ModerationError::NotAuthorized.to_string()]);

        // The denial and the command do not linger in the chat
        sleep(Duration::from_secs(11)).await;
        let deleted = gateway.deleted();
        assert!(deleted.contains(&50));
        assert_eq!(deleted.len(), 2);
    }

    #[tokio::test]
    async fn test_mute_without_reply_is_rejected() {
        let gateway = Arc::new(RecordingGateway::new());
        let handler = handler(&gateway, ModerationConfig::default());

        handler.process_message(&group_message(CHAT, ADMIN, 50, "/mute 10")).await.unwrap();

        assert!(gateway.restrictions().is_empty());
        assert_eq!(gateway.sent_texts(), vec![ModerationError::MissingReplyTarget.to_string()]);
    }

    #[tokio::test]
    async fn test_bad_duration_mutates_nothing() {
        let gateway = Arc::new(RecordingGateway::new());
        let handler = handler(&gateway, ModerationConfig::default());

        let command = replying_to(group_message(CHAT, ADMIN, 50, "/mute soon"), 49, MEMBER);
        handler.process_message(&command).await.unwrap();

        assert!(!handler.engine().is_muted(CHAT, MEMBER).await);
        assert!(gateway.restrictions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_reports_deleted_count() {
        let gateway = Arc::new(RecordingGateway::new());
        let handler = handler(&gateway, ModerationConfig::default());

        handler.process_message(&group_message(CHAT, ADMIN, 100, "/clear ۳")).await.unwrap();

        let bulk: Vec<_> = gateway
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::DeleteMessages { message_ids, .. } => Some(message_ids),
                _ => None,
            })
            .collect();
        assert_eq!(bulk, vec![vec![99, 98, 97]]);
        assert_eq!(gateway.sent_texts(), vec![CLEARING.to_string(), "Done. Messages deleted: 3".to_string()]);

        sleep(Duration::from_secs(11)).await;
        assert_eq!(gateway.deleted().len(), 3);
    }

    #[tokio::test]
    async fn test_clear_rejects_zero() {
        let gateway = Arc::new(RecordingGateway::new());
        let handler = handler(&gateway, ModerationConfig::default());

        handler.process_message(&group_message(CHAT, ADMIN, 100, "/clear 0")).await.unwrap();

        assert_eq!(gateway.sent_texts().len(), 1);
        assert!(gateway.sent_texts()[0].contains("positive"));
        assert!(gateway.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_clear_in_private_chat() {
        let gateway = Arc::new(RecordingGateway::new());
        let handler = handler(&gateway, ModerationConfig::default());

        let mut message = group_message(ADMIN, ADMIN, 5, "/clear");
        message.chat_kind = ChatKind::Private;
        handler.process_message(&message).await.unwrap();

        assert_eq!(gateway.sent_texts(), vec![ModerationError::NotGroupChat.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flood_short_circuits_filter() {
        let gateway = Arc::new(RecordingGateway::new());
        let mut config = ModerationConfig::default();
        config.spam.limit = 2;
        config.filter = FilterConfig {
            active: true,
            words: vec!["scam".to_string()],
            bypass_admins: true,
        };
        let handler = handler(&gateway, config);

        for id in 1..=3 {
            handler.process_message(&group_message(CHAT, MEMBER, id, "scam")).await.unwrap();
        }

        // Messages 1 and 2 are filtered; message 3 trips the flood limit instead
        assert!(handler.engine().is_muted(CHAT, MEMBER).await);
        let texts = gateway.sent_texts();
        assert_eq!(texts.len(), 3);
        assert_eq!(texts[2], FLOOD_WARNING);
        assert_eq!(gateway.deleted(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_plain_words_are_chat_not_commands() {
        let gateway = Arc::new(RecordingGateway::new());
        let handler = handler(&gateway, ModerationConfig::default());

        handler.process_message(&group_message(CHAT, MEMBER, 8, "clear skies today")).await.unwrap();
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_filter_applies_after_bare_command_word() {
        let gateway = Arc::new(RecordingGateway::new());
        let mut config = ModerationConfig::default();
        config.filter = FilterConfig {
            active: true,
            words: vec!["badword".to_string()],
            bypass_admins: true,
        };
        let handler = handler(&gateway, config);

        handler.process_message(&group_message(CHAT, MEMBER, 9, "mute badword")).await.unwrap();

        assert_eq!(gateway.deleted(), vec![9]);
        assert_eq!(gateway.sent_texts(), vec![FILTER_WARNING.to_string()]);
    }

    #[tokio::test]
    async fn test_filter_bypass_for_admins() {
        let gateway = Arc::new(RecordingGateway::new());
        let mut config = ModerationConfig::default();
        config.filter = FilterConfig {
            active: true,
            words: vec!["scam".to_string()],
            bypass_admins: true,
        };
        let handler = handler(&gateway, config);

        handler.process_message(&group_message(CHAT, ADMIN, 7, "not a scam")).await.unwrap();
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unmute_reply() {
        let gateway = Arc::new(RecordingGateway::new());
        let handler = handler(&gateway, ModerationConfig::default());

        let command = replying_to(group_message(CHAT, ADMIN, 60, "رفع سکوت"), 59, MEMBER);
        handler.process_message(&command).await.unwrap();
        assert!(gateway.sent_texts()[0].contains("was not muted"));

        handler.engine().request_mute(CHAT, MEMBER, None).await;
        let command = replying_to(group_message(CHAT, ADMIN, 61, "/unmute"), 59, MEMBER);
        handler.process_message(&command).await.unwrap();
        assert!(gateway.sent_texts()[1].contains("can talk again"));
        assert!(!handler.engine().is_muted(CHAT, MEMBER).await);
    }

    #[tokio::test]
    async fn test_unpin_reply() {
        let gateway = Arc::new(RecordingGateway::new());
        let handler = handler(&gateway, ModerationConfig::default());

        let command = replying_to(group_message(CHAT, ADMIN, 70, "حذف پین"), 12, MEMBER);
        handler.process_message(&command).await.unwrap();

        assert!(gateway.calls().contains(&GatewayCall::Unpin { chat_id: CHAT, message_id: 12 }));
    }

    #[test_log::test(tokio::test)]
    async fn test_bot_messages_are_ignored() {
        let gateway = Arc::new(RecordingGateway::new());
        let handler = handler(&gateway, ModerationConfig::default());

        let mut message = group_message(CHAT, 777, 1, "/clear 50");
        message.sender.is_bot = true;
        handler.process_message(&message).await.unwrap();

        assert!(gateway.calls().is_empty());
    }
}
