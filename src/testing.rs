// In-memory gateway used by the unit tests

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use crate::platforms::ModerationGateway;
use crate::types::{ChatId, ChatKind, ChatMessage, ChatUser, MessageId, ReplyTarget, UserId};

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    DeleteMessage { chat_id: ChatId, message_id: MessageId, ok: bool },
    DeleteMessages { chat_id: ChatId, message_ids: Vec<MessageId>, ok: bool },
    Restrict { chat_id: ChatId, user_id: UserId, allow_send: bool, until: Option<DateTime<Utc>> },
    SendMessage { chat_id: ChatId, text: String, reply_to: Option<MessageId>, id: MessageId },
    Unpin { chat_id: ChatId, message_id: MessageId },
}

type RestrictHook = Pin<Box<dyn Future<Output = ()> + Send>>;

pub struct RecordingGateway {
    calls: Mutex<Vec<GatewayCall>>,
    admins: Mutex<HashSet<(ChatId, UserId)>>,
    failing_deletes: Mutex<HashSet<MessageId>>,
    fail_bulk: AtomicBool,
    fail_restrict: AtomicBool,
    restrict_hooks: Mutex<Vec<(bool, RestrictHook)>>,
    next_message_id: AtomicI64,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            admins: Mutex::new(HashSet::new()),
            failing_deletes: Mutex::new(HashSet::new()),
            fail_bulk: AtomicBool::new(false),
            fail_restrict: AtomicBool::new(false),
            restrict_hooks: Mutex::new(Vec::new()),
            next_message_id: AtomicI64::new(10_000),
        }
    }

    pub fn add_admin(&self, chat_id: ChatId, user_id: UserId) {
        self.admins.lock().unwrap().insert((chat_id, user_id));
    }

    pub fn fail_bulk_deletes(&self) {
        self.fail_bulk.store(true, Ordering::SeqCst);
    }

    pub fn fail_restrictions(&self) {
        self.fail_restrict.store(true, Ordering::SeqCst);
    }

    /// Run `hook` once, inside the next restrict call with this `allow_send`,
    /// after the call is recorded and before it returns
    pub fn on_next_restrict<F>(&self, allow_send: bool, hook: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.restrict_hooks.lock().unwrap().push((allow_send, Box::pin(hook)));
    }

    fn take_restrict_hook(&self, allow_send: bool) -> Option<RestrictHook> {
        let mut hooks = self.restrict_hooks.lock().unwrap();
        let index = hooks.iter().position(|(allow, _)| *allow == allow_send)?;
        Some(hooks.remove(index).1)
    }

    pub fn fail_delete_of(&self, message_ids: impl IntoIterator<Item = MessageId>) {
        self.failing_deletes.lock().unwrap().extend(message_ids);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn restrictions(&self) -> Vec<GatewayCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, GatewayCall::Restrict { .. }))
            .collect()
    }

    /// Ids removed by successful single-message deletes
    pub fn deleted(&self) -> Vec<MessageId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::DeleteMessage { message_id, ok: true, .. } => Some(message_id),
                _ => None,
            })
            .collect()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::SendMessage { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: GatewayCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ModerationGateway for RecordingGateway {
    async fn is_admin(&self, chat_id: ChatId, user_id: UserId) -> Result<bool> {
        Ok(self.admins.lock().unwrap().contains(&(chat_id, user_id)))
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        let ok = !self.failing_deletes.lock().unwrap().contains(&message_id);
        self.record(GatewayCall::DeleteMessage { chat_id, message_id, ok });
        if ok {
            Ok(())
        } else {
            Err(anyhow!("message to delete not found"))
        }
    }

    async fn delete_messages(&self, chat_id: ChatId, message_ids: &[MessageId]) -> Result<()> {
        let ok = !self.fail_bulk.load(Ordering::SeqCst);
        self.record(GatewayCall::DeleteMessages { chat_id, message_ids: message_ids.to_vec(), ok });
        if ok {
            Ok(())
        } else {
            Err(anyhow!("bulk delete rejected"))
        }
    }

    async fn restrict(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        allow_send: bool,
        until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.record(GatewayCall::Restrict { chat_id, user_id, allow_send, until });
        if let Some(hook) = self.take_restrict_hook(allow_send) {
            hook.await;
        }
        if self.fail_restrict.load(Ordering::SeqCst) {
            Err(anyhow!("not enough rights to restrict"))
        } else {
            Ok(())
        }
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        let id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        self.record(GatewayCall::SendMessage { chat_id, text: text.to_string(), reply_to, id });
        Ok(id)
    }

    async fn unpin_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        self.record(GatewayCall::Unpin { chat_id, message_id });
        Ok(())
    }
}

pub fn group_message(chat_id: ChatId, user_id: UserId, message_id: MessageId, content: &str) -> ChatMessage {
    ChatMessage {
        chat_id,
        chat_kind: ChatKind::Supergroup,
        message_id,
        sender: ChatUser {
            id: user_id,
            is_bot: false,
            display_name: format!("user{}", user_id),
        },
        content: content.to_string(),
        reply_to: None,
        timestamp: Utc::now(),
    }
}

pub fn replying_to(mut message: ChatMessage, target_message: MessageId, target_user: UserId) -> ChatMessage {
    message.reply_to = Some(ReplyTarget {
        message_id: target_message,
        author: Some(ChatUser {
            id: target_user,
            is_bot: false,
            display_name: format!("user{}", target_user),
        }),
    });
    message
}
