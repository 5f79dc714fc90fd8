//! Telegram Bot API adapter (long polling)

use super::{
    Actor, Channel, ChannelError, Inbound, InboundKind, Keyboard, MessageRef, UpdateSource,
};
use crate::identity::{ChatId, Identity};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Seconds the server holds a `getUpdates` request open
const POLL_TIMEOUT_SECS: u64 = 30;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(POLL_TIMEOUT_SECS + 10);

/// Editing a message to its current content is not a failure for us.
const NOT_MODIFIED: &str = "message is not modified";

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    message_id: i64,
    chat: WireChat,
    #[serde(default)]
    from: Option<WireUser>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: i64,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    from: WireUser,
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a Keyboard>,
}

#[derive(Debug, Serialize)]
struct EditMessageText<'a> {
    chat_id: i64,
    message_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a Keyboard>,
}

#[derive(Debug, Serialize)]
struct EditMessageReplyMarkup<'a> {
    chat_id: i64,
    message_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a Keyboard>,
}

impl From<WireUser> for Actor {
    fn from(user: WireUser) -> Self {
        Actor {
            id: Identity(user.id),
            first_name: user.first_name,
            username: user.username,
        }
    }
}

/// Map one update to an inbound event. Updates we do not act on (bots,
/// non-text messages, channel posts, edits) map to `None`.
fn to_inbound(update: Update) -> Option<Inbound> {
    if let Some(query) = update.callback_query {
        if query.from.is_bot {
            return None;
        }
        let chat = query
            .message
            .as_ref()
            .map_or(ChatId(query.from.id), |m| ChatId(m.chat.id));
        let (message, message_text) = match query.message {
            Some(m) => (
                Some(MessageRef {
                    chat: ChatId(m.chat.id),
                    message_id: m.message_id,
                }),
                m.text,
            ),
            None => (None, None),
        };
        return Some(Inbound {
            actor: query.from.into(),
            chat,
            kind: InboundKind::Button {
                callback_id: query.id,
                payload: query.data.unwrap_or_default(),
                message,
                message_text,
            },
        });
    }

    let message = update.message?;
    let from = message.from.filter(|u| !u.is_bot)?;
    let text = message.text?;
    Some(Inbound {
        actor: from.into(),
        chat: ChatId(message.chat.id),
        kind: InboundKind::Text { text },
    })
}

// ============================================================================
// Client
// ============================================================================

/// Telegram Bot API client: both the outbound channel and the update source
pub struct TelegramChannel {
    client: reqwest::Client,
    base_url: String,
    /// Next `getUpdates` offset
    offset: AtomicI64,
}

impl TelegramChannel {
    pub fn new(api_url: &str, token: &str) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ChannelError::network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{token}", api_url.trim_end_matches('/')),
            offset: AtomicI64::new(0),
        })
    }

    async fn call<B: Serialize + ?Sized + Sync, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T, ChannelError> {
        let response = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::network(format!("{method}: {}", e.without_url())))?;

        let parsed: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| ChannelError::decode(format!("{method}: {}", e.without_url())))?;

        if !parsed.ok {
            return Err(ChannelError::api(format!(
                "{method}: {}",
                parsed.description.unwrap_or_else(|| "unknown error".to_string())
            )));
        }
        parsed
            .result
            .ok_or_else(|| ChannelError::decode(format!("{method}: missing result")))
    }

    async fn call_edit<B: Serialize + ?Sized + Sync>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<(), ChannelError> {
        match self.call::<B, Value>(method, body).await {
            Ok(_) => Ok(()),
            Err(e) if e.message.contains(NOT_MODIFIED) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageRef, ChannelError> {
        let sent: WireMessage = self
            .call(
                "sendMessage",
                &SendMessage {
                    chat_id: chat.0,
                    text,
                    reply_markup: keyboard,
                },
            )
            .await?;
        Ok(MessageRef {
            chat: ChatId(sent.chat.id),
            message_id: sent.message_id,
        })
    }

    async fn edit_message(
        &self,
        message: &MessageRef,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), ChannelError> {
        self.call_edit(
            "editMessageText",
            &EditMessageText {
                chat_id: message.chat.0,
                message_id: message.message_id,
                text,
                reply_markup: keyboard,
            },
        )
        .await
    }

    async fn edit_keyboard(
        &self,
        message: &MessageRef,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), ChannelError> {
        self.call_edit(
            "editMessageReplyMarkup",
            &EditMessageReplyMarkup {
                chat_id: message.chat.0,
                message_id: message.message_id,
                reply_markup: keyboard,
            },
        )
        .await
    }

    async fn answer_button(
        &self,
        callback_id: &str,
        alert: Option<&str>,
    ) -> Result<(), ChannelError> {
        let body = match alert {
            Some(text) => json!({ "callback_query_id": callback_id, "text": text, "show_alert": true }),
            None => json!({ "callback_query_id": callback_id }),
        };
        self.call::<Value, bool>("answerCallbackQuery", &body)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl UpdateSource for TelegramChannel {
    async fn next_batch(&self) -> Result<Vec<Inbound>, ChannelError> {
        let offset = self.offset.load(Ordering::SeqCst);
        let updates: Vec<Update> = self
            .call(
                "getUpdates",
                &json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message", "callback_query"],
                }),
            )
            .await?;

        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
            self.offset.store(last + 1, Ordering::SeqCst);
        }
        Ok(updates.into_iter().filter_map(to_inbound).collect())
    }
}
