use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{sleep, Duration};

use crate::platforms::{ModerationGateway, PlatformConnection};
use crate::types::{ChatId, ChatKind, ChatMessage, ChatUser, MessageId, ReplyTarget, UserId};

const DEFAULT_API_URL: &str = "https://api.telegram.org";
const DEFAULT_POLL_TIMEOUT: u64 = 30;

/// Bot API response envelope
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    message_id: MessageId,
    date: i64,
    chat: TelegramChat,
    from: Option<TelegramUser>,
    text: Option<String>,
    caption: Option<String>,
    reply_to_message: Option<Box<TelegramMessage>>,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: ChatId,
    #[serde(rename = "type")]
    kind: ChatKind,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    id: UserId,
    is_bot: bool,
    first_name: String,
    last_name: Option<String>,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMember {
    status: String,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: MessageId,
}

impl TelegramUser {
    fn into_chat_user(self) -> ChatUser {
        let display_name = match self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name,
        };
        ChatUser {
            id: self.id,
            is_bot: self.is_bot,
            display_name,
        }
    }
}

/// Configuration for the Telegram Bot API connection
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub api_url: String,
    /// Long-poll timeout passed to getUpdates
    pub poll_timeout_seconds: u64,
}

impl TelegramConfig {
    /// Load Telegram configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let bot_token = env::var("TELEGRAM_BOT_TOKEN")
            .or_else(|_| env::var("TOKEN"))
            .context("TELEGRAM_BOT_TOKEN environment variable not set")?;

        if !bot_token.contains(':') {
            return Err(anyhow::anyhow!(
                "TELEGRAM_BOT_TOKEN does not look like a bot token - got: {}...",
                bot_token.chars().take(6).collect::<String>()
            ));
        }

        let api_url = env::var("TELEGRAM_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        let poll_timeout_seconds = parse_poll_timeout(env::var("TELEGRAM_POLL_TIMEOUT").ok().as_deref())?;

        info!("Loaded Telegram config (api {}, poll timeout {}s)", api_url, poll_timeout_seconds);

        Ok(Self {
            bot_token,
            api_url,
            poll_timeout_seconds,
        })
    }
}

fn parse_poll_timeout(raw: Option<&str>) -> Result<u64> {
    match raw.map(str::trim) {
        None | Some("") => Ok(DEFAULT_POLL_TIMEOUT),
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("TELEGRAM_POLL_TIMEOUT has an invalid value: {}", raw)),
    }
}

/// Thin Bot API client; implements the moderation calls
#[derive(Clone)]
pub struct TelegramApi {
    config: TelegramConfig,
    http_client: reqwest::Client,
}

impl TelegramApi {
    pub fn new(config: TelegramConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_seconds + 15))
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self { config, http_client }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> Result<T> {
        let url = format!("{}/bot{}/{}", self.config.api_url, self.config.bot_token, method);

        let response: ApiResponse<T> = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to call Telegram {}", method))?
            .json()
            .await
            .with_context(|| format!("Failed to parse Telegram {} response", method))?;

        if !response.ok {
            return Err(anyhow::anyhow!(
                "Telegram {} failed ({}): {}",
                method,
                response.error_code.unwrap_or_default(),
                response.description.unwrap_or_else(|| "no description".to_string())
            ));
        }

        response
            .result
            .with_context(|| format!("Telegram {} returned no result", method))
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": self.config.poll_timeout_seconds,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    async fn bot_username(&self) -> Result<String> {
        let me: TelegramUser = self.call("getMe", json!({})).await?;
        Ok(me.username.unwrap_or(me.first_name))
    }
}

/// Every send-type permission set to `allow`
fn send_permissions(allow: bool) -> serde_json::Value {
    json!({
        "can_send_messages": allow,
        "can_send_audios": allow,
        "can_send_documents": allow,
        "can_send_photos": allow,
        "can_send_videos": allow,
        "can_send_video_notes": allow,
        "can_send_voice_notes": allow,
        "can_send_polls": allow,
        "can_send_other_messages": allow,
        "can_add_web_page_previews": allow,
    })
}

fn message_time(date: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(date, 0).single().unwrap_or_else(Utc::now)
}

/// Convert a Bot API message to our format. Anonymous posts are skipped.
fn convert_message(message: TelegramMessage) -> Option<ChatMessage> {
    let sender = message.from?.into_chat_user();
    let reply_to = message.reply_to_message.map(|reply| ReplyTarget {
        message_id: reply.message_id,
        author: reply.from.map(TelegramUser::into_chat_user),
    });

    Some(ChatMessage {
        chat_id: message.chat.id,
        chat_kind: message.chat.kind,
        message_id: message.message_id,
        sender,
        content: message.text.or(message.caption).unwrap_or_default(),
        reply_to,
        timestamp: message_time(message.date),
    })
}

#[async_trait]
impl ModerationGateway for TelegramApi {
    async fn is_admin(&self, chat_id: ChatId, user_id: UserId) -> Result<bool> {
        let member: ChatMember = self
            .call("getChatMember", json!({ "chat_id": chat_id, "user_id": user_id }))
            .await?;
        Ok(matches!(member.status.as_str(), "administrator" | "creator"))
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        let _: bool = self
            .call("deleteMessage", json!({ "chat_id": chat_id, "message_id": message_id }))
            .await?;
        debug!("Deleted message {} in {}", message_id, chat_id);
        Ok(())
    }

    async fn delete_messages(&self, chat_id: ChatId, message_ids: &[MessageId]) -> Result<()> {
        let _: bool = self
            .call("deleteMessages", json!({ "chat_id": chat_id, "message_ids": message_ids }))
            .await?;
        Ok(())
    }

    async fn restrict(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        allow_send: bool,
        until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut body = json!({
            "chat_id": chat_id,
            "user_id": user_id,
            "permissions": send_permissions(allow_send),
        });
        if let Some(until) = until {
            body["until_date"] = json!(until.timestamp());
        }

        let _: bool = self.call("restrictChatMember", body).await?;
        debug!("Set send permission of {} in {} to {}", user_id, chat_id, allow_send);
        Ok(())
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if let Some(reply_to) = reply_to {
            body["reply_parameters"] = json!({
                "message_id": reply_to,
                "allow_sending_without_reply": true,
            });
        }

        let sent: SentMessage = self.call("sendMessage", body).await?;
        Ok(sent.message_id)
    }

    async fn unpin_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        let _: bool = self
            .call("unpinChatMessage", json!({ "chat_id": chat_id, "message_id": message_id }))
            .await?;
        Ok(())
    }
}

/// Long-polling update receiver
pub struct TelegramConnection {
    api: Arc<TelegramApi>,
    message_sender: Option<broadcast::Sender<ChatMessage>>,
    is_connected: Arc<RwLock<bool>>,
}

impl TelegramConnection {
    pub fn new(api: Arc<TelegramApi>) -> Self {
        Self {
            api,
            message_sender: None,
            is_connected: Arc::new(RwLock::new(false)),
        }
    }
}

#[async_trait]
impl PlatformConnection for TelegramConnection {
    async fn connect(&mut self) -> Result<()> {
        info!("Connecting to Telegram Bot API...");

        let username = self
            .api
            .bot_username()
            .await
            .context("Failed to connect to Telegram Bot API")?;
        info!("Authenticated as @{}", username);

        let (tx, _) = broadcast::channel(1000);
        self.message_sender = Some(tx.clone());
        *self.is_connected.write().await = true;

        let message_sender = tx;
        let is_connected = Arc::clone(&self.is_connected);
        let api = Arc::clone(&self.api);

        tokio::spawn(async move {
            info!("Telegram update poller started");
            let base_backoff = Duration::from_secs(1);
            let mut backoff = base_backoff;
            let mut offset = 0;

            loop {
                if !*is_connected.read().await {
                    info!("Telegram connection marked as disconnected, stopping poller");
                    break;
                }

                match api.get_updates(offset).await {
                    Ok(updates) => {
                        backoff = base_backoff;
                        debug!("Polled {} Telegram updates", updates.len());

                        for update in updates {
                            offset = offset.max(update.update_id + 1);
                            let Some(chat_message) = update.message.and_then(convert_message) else {
                                continue;
                            };
                            if let Err(e) = message_sender.send(chat_message) {
                                warn!("Failed to broadcast Telegram message: {}", e);
                            }
                        }
                    }
                    Err(e) => {
                        error!("Failed to poll Telegram updates: {}", e);

                        let text = e.to_string();
                        if text.contains("(401)") || text.contains("(404)") {
                            error!("Telegram rejected the bot token, marking as disconnected");
                            *is_connected.write().await = false;
                            break;
                        }

                        sleep(backoff).await;
                        backoff = std::cmp::min(backoff * 2, Duration::from_secs(60));
                        warn!("Backing off Telegram polling to {:?}", backoff);
                    }
                }
            }

            warn!("Telegram update poller stopped");
        });

        info!("Telegram connection established");
        Ok(())
    }

    fn platform_name(&self) -> &str {
        "telegram"
    }

    async fn is_connected(&self) -> bool {
        *self.is_connected.read().await
    }

    fn get_message_receiver(&self) -> Option<broadcast::Receiver<ChatMessage>> {
        self.message_sender.as_ref().map(|sender| sender.subscribe())
    }

    async fn disconnect(&mut self) -> Result<()> {
        *self.is_connected.write().await = false;
        self.message_sender = None;
        info!("Disconnected from Telegram");
        Ok(())
    }
}
