//! Messaging channel abstraction
//!
//! Inbound events and the outbound actions the engine needs (send, edit,
//! acknowledge). The Telegram Bot API adapter lives in [`telegram`].

mod telegram;

use crate::identity::{ChatId, Identity};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

pub use telegram::TelegramChannel;

// ============================================================================
// Inbound
// ============================================================================

/// Who sent an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: Identity,
    pub first_name: String,
    pub username: Option<String>,
}

impl Actor {
    /// How reviewers see the originator of a report
    pub fn mention(&self) -> String {
        match &self.username {
            Some(username) => format!("@{username}"),
            None => format!("{} (id {})", self.first_name, self.id),
        }
    }
}

/// A message previously sent by the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub chat: ChatId,
    pub message_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundKind {
    /// Free text, including `/commands`
    Text { text: String },
    /// A button press on one of our messages
    Button {
        callback_id: String,
        payload: String,
        message: Option<MessageRef>,
        /// Current text of the message the button belongs to
        message_text: Option<String>,
    },
}

/// One event from the channel, always attributable to one actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub actor: Actor,
    /// Chat the event happened in
    pub chat: ChatId,
    pub kind: InboundKind,
}

impl Inbound {
    pub fn source_message(&self) -> Option<&MessageRef> {
        match &self.kind {
            InboundKind::Button { message, .. } => message.as_ref(),
            InboundKind::Text { .. } => None,
        }
    }

    pub fn callback_id(&self) -> Option<&str> {
        match &self.kind {
            InboundKind::Button { callback_id, .. } => Some(callback_id),
            InboundKind::Text { .. } => None,
        }
    }
}

// ============================================================================
// Outbound
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    pub text: String,
    /// Opaque payload echoed back in the button event (at most 64 bytes)
    #[serde(rename = "callback_data")]
    pub payload: String,
}

impl Button {
    pub fn new(text: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            payload: payload.into(),
        }
    }
}

/// Rows of buttons attached to a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Keyboard {
    #[serde(rename = "inline_keyboard")]
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, buttons: impl IntoIterator<Item = Button>) -> Self {
        let row: Vec<Button> = buttons.into_iter().collect();
        if !row.is_empty() {
            self.rows.push(row);
        }
        self
    }

    /// Lay `buttons` out `per_row` at a time
    pub fn grid(mut self, buttons: impl IntoIterator<Item = Button>, per_row: usize) -> Self {
        let mut row = Vec::with_capacity(per_row);
        for button in buttons {
            row.push(button);
            if row.len() == per_row.max(1) {
                self.rows.push(std::mem::take(&mut row));
            }
        }
        if !row.is_empty() {
            self.rows.push(row);
        }
        self
    }

    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelErrorKind {
    /// Connection problems, timeouts
    Network,
    /// The API answered with an error
    Api,
    /// The response could not be understood
    Decode,
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct ChannelError {
    pub kind: ChannelErrorKind,
    pub message: String,
}

impl ChannelError {
    pub fn new(kind: ChannelErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ChannelErrorKind::Network, message)
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(ChannelErrorKind::Api, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ChannelErrorKind::Decode, message)
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Outbound side of the messaging channel
#[async_trait]
pub trait Channel: Send + Sync {
    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageRef, ChannelError>;

    /// Replace text and buttons of a message
    async fn edit_message(
        &self,
        message: &MessageRef,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), ChannelError>;

    /// Replace only the buttons; `None` removes them
    async fn edit_keyboard(
        &self,
        message: &MessageRef,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), ChannelError>;

    /// Acknowledge a button press, optionally with an alert shown only to the actor
    async fn answer_button(&self, callback_id: &str, alert: Option<&str>)
        -> Result<(), ChannelError>;
}

/// Inbound side of the messaging channel
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Wait for the next batch of events
    async fn next_batch(&self) -> Result<Vec<Inbound>, ChannelError>;
}

#[async_trait]
impl<T: Channel + ?Sized> Channel for Arc<T> {
    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageRef, ChannelError> {
        (**self).send_message(chat, text, keyboard).await
    }

    async fn edit_message(
        &self,
        message: &MessageRef,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), ChannelError> {
        (**self).edit_message(message, text, keyboard).await
    }

    async fn edit_keyboard(
        &self,
        message: &MessageRef,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), ChannelError> {
        (**self).edit_keyboard(message, keyboard).await
    }

    async fn answer_button(
        &self,
        callback_id: &str,
        alert: Option<&str>,
    ) -> Result<(), ChannelError> {
        (**self).answer_button(callback_id, alert).await
    }
}
