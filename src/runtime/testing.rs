//! Mock implementations for testing
//!
//! A recording channel and a scripted update source, plus end-to-end tests
//! of the engine and the runtime manager without real I/O.

use super::{Engine, RuntimeManager};
use crate::access::{AccessControl, AccessList};
use crate::catalog::{Catalog, CatalogFile, CategoryFile};
use crate::channel::{
    Actor, Channel, ChannelError, Inbound, InboundKind, Keyboard, MessageRef, UpdateSource,
};
use crate::config::{BotSettings, SettingsStore};
use crate::handoff::HandoffRegistry;
use crate::identity::{ChatId, Identity};
use crate::state_machine::{DialogState, StateKind};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Recording Channel
// ============================================================================

/// One outbound call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Message {
        message: MessageRef,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Edit {
        message: MessageRef,
        text: String,
        keyboard: Option<Keyboard>,
    },
    EditKeyboard {
        message: MessageRef,
        keyboard: Option<Keyboard>,
    },
    Answer {
        callback_id: String,
        alert: Option<String>,
    },
}

/// Channel that records every call and fails sends to chosen chats
#[derive(Default)]
pub struct RecordingChannel {
    log: Mutex<Vec<Sent>>,
    next_message_id: AtomicI64,
    failing_chats: Mutex<HashSet<ChatId>>,
    held_chats: Mutex<HashSet<ChatId>>,
    released: Notify,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every send to `chat` fail
    pub fn fail_sends_to(&self, chat: ChatId) {
        self.failing_chats.lock().unwrap().insert(chat);
    }

    /// Park every send to `chat` until [`Self::release_sends_to`]
    pub fn hold_sends_to(&self, chat: ChatId) {
        self.held_chats.lock().unwrap().insert(chat);
    }

    pub fn release_sends_to(&self, chat: ChatId) {
        self.held_chats.lock().unwrap().remove(&chat);
        self.released.notify_waiters();
    }

    pub fn log(&self) -> Vec<Sent> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
    }

    /// `(message, text, keyboard)` of new messages sent to `chat`
    pub fn messages_to(&self, chat: ChatId) -> Vec<(MessageRef, String, Option<Keyboard>)> {
        self.log()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Message {
                    message,
                    text,
                    keyboard,
                } if message.chat == chat => Some((message, text, keyboard)),
                _ => None,
            })
            .collect()
    }

    pub fn edits(&self) -> Vec<(MessageRef, String)> {
        self.log()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Edit { message, text, .. } => Some((message, text)),
                _ => None,
            })
            .collect()
    }

    pub fn answers(&self) -> Vec<Option<String>> {
        self.log()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Answer { alert, .. } => Some(alert),
                _ => None,
            })
            .collect()
    }

    fn record(&self, sent: Sent) {
        self.log.lock().unwrap().push(sent);
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageRef, ChannelError> {
        loop {
            let released = self.released.notified();
            let held = self.held_chats.lock().unwrap().contains(&chat);
            if !held {
                break;
            }
            released.await;
        }
        if self.failing_chats.lock().unwrap().contains(&chat) {
            return Err(ChannelError::api("Forbidden: bot is not a member of the chat"));
        }
        let message = MessageRef {
            chat,
            message_id: self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1,
        };
        self.record(Sent::Message {
            message: message.clone(),
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(message)
    }

    async fn edit_message(
        &self,
        message: &MessageRef,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), ChannelError> {
        self.record(Sent::Edit {
            message: message.clone(),
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn edit_keyboard(
        &self,
        message: &MessageRef,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), ChannelError> {
        self.record(Sent::EditKeyboard {
            message: message.clone(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn answer_button(
        &self,
        callback_id: &str,
        alert: Option<&str>,
    ) -> Result<(), ChannelError> {
        self.record(Sent::Answer {
            callback_id: callback_id.to_string(),
            alert: alert.map(str::to_string),
        });
        Ok(())
    }
}

// ============================================================================
// Scripted Update Source
// ============================================================================

/// Hands out queued batches, then waits forever
#[derive(Default)]
pub struct ScriptedSource {
    batches: Mutex<VecDeque<Result<Vec<Inbound>, ChannelError>>>,
    pub polls: AtomicI64,
}

impl ScriptedSource {
    pub fn push(&self, batch: Result<Vec<Inbound>, ChannelError>) {
        self.batches.lock().unwrap().push_back(batch);
    }
}

#[async_trait]
impl UpdateSource for ScriptedSource {
    async fn next_batch(&self) -> Result<Vec<Inbound>, ChannelError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let next = self.batches.lock().unwrap().pop_front();
        match next {
            Some(batch) => batch,
            None => std::future::pending().await,
        }
    }
}

// ============================================================================
// Fixtures
// ============================================================================

const SUPER_ADMIN: Identity = Identity(1);
const ADMIN: Identity = Identity(2);
const MECHANIC: Identity = Identity(10);
const DISPATCHER: Identity = Identity(20);
const STRANGER: Identity = Identity(99);
const REVIEW_CHAT: ChatId = ChatId(-100);

const DAY: Duration = Duration::from_secs(24 * 3600);

fn test_catalog() -> Catalog {
    Catalog::from_file_contents(CatalogFile {
        repair_kinds: vec!["Quick repair".into(), "Ready for pickup".into()],
        locations: vec!["North".into(), "South".into()],
        categories: vec![
            CategoryFile {
                name: "X".into(),
                items: vec!["🛞 p".into(), "q".into(), "r".into()],
            },
            CategoryFile {
                name: "Y".into(),
                items: vec!["s".into()],
            },
        ],
    })
    .unwrap()
}

struct Harness {
    engine: Engine<Arc<RecordingChannel>>,
    channel: Arc<RecordingChannel>,
    access: AccessControl,
    settings: SettingsStore,
    catalog: Arc<Catalog>,
    /// Message ids handed out for button events
    next_callback: AtomicI64,
}

fn harness_with(review_chat: Option<ChatId>, ttl: Duration) -> Harness {
    let channel = RecordingChannel::new();
    let catalog = Arc::new(test_catalog());
    let access = AccessControl::in_memory(SUPER_ADMIN);
    access.add(AccessList::Users, MECHANIC).unwrap();
    access.add(AccessList::Admins, ADMIN).unwrap();
    let settings = SettingsStore::in_memory(BotSettings {
        review_chat_id: review_chat,
    });
    let engine = Engine::new(
        Arc::clone(&channel),
        Arc::clone(&catalog),
        access.clone(),
        settings.clone(),
        Arc::new(HandoffRegistry::new(ttl)),
    );
    Harness {
        engine,
        channel,
        access,
        settings,
        catalog,
        next_callback: AtomicI64::new(0),
    }
}

fn harness() -> Harness {
    harness_with(Some(REVIEW_CHAT), DAY)
}

fn actor(id: Identity) -> Actor {
    Actor {
        id,
        first_name: format!("User{}", id.0),
        username: None,
    }
}

fn text_from(id: Identity, text: &str) -> Inbound {
    Inbound {
        actor: actor(id),
        chat: id.chat(),
        kind: InboundKind::Text { text: text.into() },
    }
}

impl Harness {
    async fn text(&self, id: Identity, text: &str) {
        self.engine.handle(&text_from(id, text)).await;
    }

    /// Press a button on a message in the actor's private chat
    async fn press(&self, id: Identity, payload: &str) {
        let n = self.next_callback.fetch_add(1, Ordering::SeqCst);
        let inbound = Inbound {
            actor: actor(id),
            chat: id.chat(),
            kind: InboundKind::Button {
                callback_id: format!("cb{n}"),
                payload: payload.into(),
                message: Some(MessageRef {
                    chat: id.chat(),
                    message_id: 1000 + n,
                }),
                message_text: None,
            },
        };
        self.engine.handle(&inbound).await;
    }

    /// Press a button on the review request in the review chat
    async fn review(&self, id: Identity, payload: &str, request: &MessageRef, text: &str) {
        let inbound = Inbound {
            actor: actor(id),
            chat: request.chat,
            kind: InboundKind::Button {
                callback_id: format!("review-{payload}"),
                payload: payload.into(),
                message: Some(request.clone()),
                message_text: Some(text.into()),
            },
        };
        self.engine.handle(&inbound).await;
    }

    fn state(&self, id: Identity) -> StateKind {
        self.engine.sessions().state_of(id)
    }

    fn item(&self, name: &str) -> String {
        format!("work_{}", self.catalog.item_key(name).unwrap())
    }

    /// Drive the mechanic to the final confirmation with items p and q
    async fn fill_report(&self) {
        self.text(MECHANIC, "/start").await;
        self.text(MECHANIC, "ab123c").await;
        self.press(MECHANIC, "type_k0").await;
        self.press(MECHANIC, "loc_l0").await;
        self.press(MECHANIC, "category_c0").await;
        self.press(MECHANIC, &self.item("🛞 p")).await;
        self.press(MECHANIC, &self.item("q")).await;
        self.press(MECHANIC, "confirm").await;
        assert_eq!(self.state(MECHANIC), StateKind::AwaitFinalConfirm);
    }

    /// The one review request posted so far, with its token
    fn review_request(&self) -> (MessageRef, String, String) {
        let requests = self.channel.messages_to(REVIEW_CHAT);
        assert_eq!(requests.len(), 1, "expected one review request");
        let (message, text, keyboard) = requests.into_iter().next().unwrap();
        let accept = keyboard
            .unwrap()
            .buttons()
            .find(|b| b.payload.starts_with("accept_"))
            .unwrap()
            .payload
            .clone();
        let token = accept.trim_start_matches("accept_").to_string();
        (message, text, token)
    }
}

// ============================================================================
// Report Dialogue
// ============================================================================

#[tokio::test]
async fn test_full_report_is_handed_off_and_accepted() {
    let h = harness();

    h.text(MECHANIC, "/start").await;
    h.text(MECHANIC, "ab123c").await;
    assert_eq!(h.state(MECHANIC), StateKind::AwaitRepairKind);
    let session = h.engine.sessions().get(MECHANIC).unwrap();
    assert_eq!(session.draft.target_id.unwrap().as_str(), "AB123C");

    h.fill_report().await;
    h.press(MECHANIC, "final_confirm").await;

    // Exactly one pending entry, addressed to the review chat
    assert_eq!(h.engine.handoffs().len(), 1);
    assert!(h.engine.sessions().get(MECHANIC).is_none());
    let (request, text, token) = h.review_request();
    assert!(text.contains("Bike No AB123C"));
    assert!(text.contains("Completed work: p; q"));
    assert!(h
        .channel
        .edits()
        .iter()
        .any(|(_, t)| t.starts_with("✅ Report sent")));

    // A dispatcher in the review chat accepts
    h.channel.clear();
    h.review(DISPATCHER, &format!("accept_{token}"), &request, &text)
        .await;
    assert_eq!(h.engine.handoffs().len(), 0);

    let notices = h.channel.messages_to(MECHANIC.chat());
    assert_eq!(notices.len(), 1);
    assert!(notices[0].1.contains("AB123C was accepted"));

    let edits = h.channel.edits();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].0, request);
    assert!(edits[0].1.starts_with(&text));
    assert!(edits[0].1.ends_with("accepted by dispatcher User20."));
    assert_eq!(
        h.channel.answers(),
        vec![Some("Report accepted. The mechanic has been notified.".to_string())]
    );

    // Any second decision is stale
    h.channel.clear();
    h.review(DISPATCHER, &format!("decline_{token}"), &request, &text)
        .await;
    assert_eq!(
        h.channel.answers(),
        vec![Some("Report data not found. It may be outdated.".to_string())]
    );
    assert!(h.channel.messages_to(MECHANIC.chat()).is_empty());
}

#[tokio::test]
async fn test_decline_notifies_originator() {
    let h = harness();
    h.fill_report().await;
    h.press(MECHANIC, "final_confirm").await;
    let (request, text, token) = h.review_request();

    h.channel.clear();
    h.review(DISPATCHER, &format!("decline_{token}"), &request, &text)
        .await;
    let notices = h.channel.messages_to(MECHANIC.chat());
    assert_eq!(notices.len(), 1);
    assert!(notices[0].1.contains("declined"));
    assert!(notices[0].1.contains("Please check the report."));
}

#[tokio::test]
async fn test_invalid_target_id_reprompts() {
    let h = harness();
    h.text(MECHANIC, "/start").await;
    h.text(MECHANIC, "A1").await;
    assert_eq!(h.state(MECHANIC), StateKind::AwaitTargetId);
    let last = h.channel.messages_to(MECHANIC.chat()).pop().unwrap();
    assert_eq!(last.1, "❌ Invalid format. Example: AB123C");
}

#[tokio::test]
async fn test_empty_confirm_alerts_and_stays() {
    let h = harness();
    h.text(MECHANIC, "/start").await;
    h.text(MECHANIC, "AB123C").await;
    h.press(MECHANIC, "type_k0").await;
    h.press(MECHANIC, "loc_l1").await;
    h.channel.clear();

    h.press(MECHANIC, "confirm").await;
    assert_eq!(h.state(MECHANIC), StateKind::AwaitCategory);
    assert_eq!(
        h.channel.answers(),
        vec![Some("Please select at least one completed work item.".to_string())]
    );
    assert_eq!(h.engine.handoffs().len(), 0);
}

#[tokio::test]
async fn test_custom_item_is_reported_verbatim() {
    let h = harness();
    h.text(MECHANIC, "/start").await;
    h.text(MECHANIC, "AB123C").await;
    h.press(MECHANIC, "type_k1").await;
    h.press(MECHANIC, "loc_l0").await;
    h.press(MECHANIC, "category_c1").await;
    h.press(MECHANIC, "add_custom").await;
    assert_eq!(h.state(MECHANIC), StateKind::AwaitCustomItemText);
    h.text(MECHANIC, "Replaced bell").await;
    assert_eq!(h.state(MECHANIC), StateKind::AwaitCategory);
    h.press(MECHANIC, "confirm").await;
    h.press(MECHANIC, "final_confirm").await;

    let (_, text, _) = h.review_request();
    assert!(text.contains("Repair type: Ready for pickup"));
    assert!(text.contains("Completed work: Replaced bell"));
}

#[tokio::test]
async fn test_restart_strips_buttons_and_prompts_again() {
    let h = harness();
    h.fill_report().await;
    h.channel.clear();

    h.press(MECHANIC, "restart").await;
    assert_eq!(h.state(MECHANIC), StateKind::AwaitTargetId);
    let log = h.channel.log();
    assert!(matches!(log[0], Sent::EditKeyboard { keyboard: None, .. }));
    assert!(matches!(&log[1], Sent::Message { text, .. } if text.contains("enter the bike number")));
    assert!(h.engine.sessions().get(MECHANIC).unwrap().draft.selected_items.is_empty());
}

#[tokio::test]
async fn test_cancel_clears_session() {
    let h = harness();
    h.fill_report().await;
    h.press(MECHANIC, "cancel").await;
    assert!(h.engine.sessions().get(MECHANIC).is_none());
    assert_eq!(h.channel.edits().last().unwrap().1, "Action cancelled.");
}

// ============================================================================
// Failure Paths
// ============================================================================

#[tokio::test]
async fn test_missing_review_chat_creates_no_entry() {
    let h = harness_with(None, DAY);
    h.fill_report().await;
    h.press(MECHANIC, "final_confirm").await;

    assert_eq!(h.engine.handoffs().len(), 0);
    assert!(h.engine.sessions().get(MECHANIC).is_none());
    let (_, text) = h.channel.edits().pop().unwrap();
    assert!(text.contains("review chat is not configured"));
}

#[tokio::test]
async fn test_failed_review_delivery_withdraws_entry() {
    let h = harness();
    h.channel.fail_sends_to(REVIEW_CHAT);
    h.fill_report().await;
    h.press(MECHANIC, "final_confirm").await;

    assert_eq!(h.engine.handoffs().len(), 0);
    let (_, text) = h.channel.edits().pop().unwrap();
    assert!(text.starts_with("❌ Failed to send the report: Forbidden"));
}

#[tokio::test]
async fn test_unreachable_originator_still_consumes_entry() {
    let h = harness();
    h.fill_report().await;
    h.press(MECHANIC, "final_confirm").await;
    let (request, text, token) = h.review_request();

    h.channel.fail_sends_to(MECHANIC.chat());
    h.review(DISPATCHER, &format!("accept_{token}"), &request, &text)
        .await;
    assert_eq!(h.engine.handoffs().len(), 0);
}

#[tokio::test]
async fn test_unauthorized_identity_never_gets_a_session() {
    let h = harness();
    for text in ["/start", "AB123C", "hello"] {
        h.text(STRANGER, text).await;
    }
    for payload in ["type_k0", "confirm", "final_confirm", "cancel", "restart"] {
        h.press(STRANGER, payload).await;
    }
    assert!(h.engine.sessions().get(STRANGER).is_none());
    assert_eq!(h.engine.sessions().len(), 0);

    let replies = h.channel.messages_to(STRANGER.chat());
    assert!(replies[0].1.starts_with("You are not allowed to use this bot"));
}

#[tokio::test]
async fn test_revoked_identity_loses_session() {
    let h = harness();
    h.text(MECHANIC, "/start").await;
    h.text(MECHANIC, "AB123C").await;
    h.access.remove(SUPER_ADMIN, AccessList::Users, MECHANIC).unwrap();

    h.press(MECHANIC, "type_k0").await;
    assert!(h.engine.sessions().get(MECHANIC).is_none());
}

#[tokio::test]
async fn test_myid_needs_no_authorization() {
    let h = harness();
    h.text(STRANGER, "/myid").await;
    let replies = h.channel.messages_to(STRANGER.chat());
    assert_eq!(replies[0].1, "Your Telegram ID: 99");
    assert!(h.engine.sessions().get(STRANGER).is_none());
}

#[tokio::test]
async fn test_outsider_cannot_decide() {
    let h = harness();
    h.fill_report().await;
    h.press(MECHANIC, "final_confirm").await;
    let (_, _, token) = h.review_request();

    h.channel.clear();
    h.press(STRANGER, &format!("accept_{token}")).await;
    assert_eq!(h.engine.handoffs().len(), 1);
    assert_eq!(
        h.channel.answers(),
        vec![Some("You are not allowed to review reports.".to_string())]
    );
}

#[tokio::test]
async fn test_member_may_decide_outside_review_chat() {
    let h = harness();
    h.fill_report().await;
    h.press(MECHANIC, "final_confirm").await;
    let (_, _, token) = h.review_request();

    h.press(ADMIN, &format!("decline_{token}")).await;
    assert_eq!(h.engine.handoffs().len(), 0);
}

#[tokio::test]
async fn test_unhandled_events_fall_to_catch_alls() {
    let h = harness();
    h.text(MECHANIC, "/start").await;
    h.channel.clear();

    h.press(MECHANIC, "work_w0").await;
    assert_eq!(
        h.channel.answers(),
        vec![Some("This action is no longer available.".to_string())]
    );
    assert!(h
        .channel
        .log()
        .iter()
        .any(|s| matches!(s, Sent::EditKeyboard { keyboard: None, .. })));
    assert_eq!(h.state(MECHANIC), StateKind::AwaitTargetId);

    h.text(MECHANIC, "AB123C").await;
    h.text(MECHANIC, "what now").await;
    let last = h.channel.messages_to(MECHANIC.chat()).pop().unwrap();
    assert!(last.1.starts_with("I don't understand"));
    assert!(h.engine.sessions().get(MECHANIC).is_none());
}

#[tokio::test]
async fn test_expired_report_is_swept_and_stale() {
    let h = harness_with(Some(REVIEW_CHAT), Duration::ZERO);
    h.fill_report().await;
    h.press(MECHANIC, "final_confirm").await;
    let (request, text, token) = h.review_request();
    h.channel.clear();

    assert_eq!(h.engine.sweep_expired().await, 1);
    assert_eq!(h.engine.handoffs().len(), 0);
    let notices = h.channel.messages_to(MECHANIC.chat());
    assert!(notices[0].1.contains("expired without a decision"));

    h.review(DISPATCHER, &format!("accept_{token}"), &request, &text)
        .await;
    assert_eq!(
        h.channel.answers().last().cloned().flatten().as_deref(),
        Some("Report data not found. It may be outdated.")
    );
}

#[tokio::test]
async fn test_decision_after_expiry_still_notifies_originator() {
    let h = harness_with(Some(REVIEW_CHAT), Duration::ZERO);
    h.fill_report().await;
    h.press(MECHANIC, "final_confirm").await;
    let (request, text, token) = h.review_request();
    h.channel.clear();

    // The decision lands before any sweep has run
    h.review(DISPATCHER, &format!("accept_{token}"), &request, &text)
        .await;
    assert_eq!(
        h.channel.answers(),
        vec![Some("Report data not found. It may be outdated.".to_string())]
    );
    assert!(h
        .channel
        .log()
        .iter()
        .any(|s| matches!(s, Sent::EditKeyboard { message, keyboard: None } if *message == request)));
    let notices = h.channel.messages_to(MECHANIC.chat());
    assert_eq!(notices.len(), 1);
    assert!(notices[0].1.contains("AB123C expired without a decision"));

    // Nothing is left for the sweeper, and the originator is not told twice
    assert_eq!(h.engine.handoffs().len(), 0);
    assert_eq!(h.engine.sweep_expired().await, 0);
    assert_eq!(h.channel.messages_to(MECHANIC.chat()).len(), 1);
}

// ============================================================================
// Admin Panel
// ============================================================================

#[tokio::test]
async fn test_admin_adds_mechanic() {
    let h = harness();
    h.text(ADMIN, "/admin").await;
    assert_eq!(h.state(ADMIN), StateKind::AdminMenu);
    h.press(ADMIN, "admin_add_mechanic").await;
    h.text(ADMIN, "abc").await;
    assert_eq!(h.state(ADMIN), StateKind::AdminAwaitInput);
    h.text(ADMIN, "555").await;
    assert_eq!(h.state(ADMIN), StateKind::AdminMenu);
    assert!(h.access.is_authorized(Identity(555)));

    h.press(ADMIN, "admin_add_mechanic").await;
    h.text(ADMIN, "555").await;
    let texts: Vec<_> = h
        .channel
        .messages_to(ADMIN.chat())
        .into_iter()
        .map(|m| m.1)
        .collect();
    assert!(texts.contains(&"User 555 added.".to_string()));
    assert!(texts.contains(&"This user is already authorized.".to_string()));
}

#[tokio::test]
async fn test_super_admin_cannot_be_removed() {
    let h = harness();
    for actor in [SUPER_ADMIN, ADMIN] {
        h.text(actor, "/admin").await;
        h.press(actor, "admin_remove_admin").await;
        h.text(actor, &SUPER_ADMIN.to_string()).await;
        let outcome = h.channel.messages_to(actor.chat());
        assert!(outcome
            .iter()
            .any(|m| m.1 == "You cannot remove the super-admin."));
    }
    assert!(h.access.is_admin(SUPER_ADMIN));
    assert_eq!(h.access.list(AccessList::Admins), vec![ADMIN]);
}

#[tokio::test]
async fn test_only_super_admin_removes_admins() {
    let h = harness();
    h.access.add(AccessList::Admins, Identity(3)).unwrap();

    h.text(ADMIN, "/admin").await;
    h.press(ADMIN, "admin_remove_admin").await;
    h.text(ADMIN, "3").await;
    assert!(h.access.is_admin(Identity(3)));

    h.text(SUPER_ADMIN, "/admin").await;
    h.press(SUPER_ADMIN, "admin_remove_admin").await;
    h.text(SUPER_ADMIN, "3").await;
    assert!(!h.access.is_admin(Identity(3)));
}

#[tokio::test]
async fn test_admin_sets_review_chat() {
    let h = harness_with(None, DAY);
    h.text(SUPER_ADMIN, "/admin").await;
    h.press(SUPER_ADMIN, "admin_set_review_chat").await;
    h.text(SUPER_ADMIN, "-1005").await;
    assert_eq!(h.settings.review_chat(), Some(ChatId(-1005)));

    h.press(SUPER_ADMIN, "admin_exit").await;
    assert!(h.engine.sessions().get(SUPER_ADMIN).is_none());
}

#[tokio::test]
async fn test_admin_listing_and_back() {
    let h = harness();
    h.text(ADMIN, "/admin").await;
    h.press(ADMIN, "admin_list_mechanics").await;
    let (_, listing) = h.channel.edits().pop().unwrap();
    assert_eq!(listing, "Authorized mechanics:\n\n10");
    assert_eq!(h.state(ADMIN), StateKind::AdminMenu);

    h.press(ADMIN, "admin_back_to_menu").await;
    assert_eq!(h.channel.edits().pop().unwrap().1, "Admin panel:");
}

#[tokio::test]
async fn test_non_admin_cannot_open_panel() {
    let h = harness();
    h.text(MECHANIC, "/admin").await;
    assert!(h.engine.sessions().get(MECHANIC).is_none());
    let reply = h.channel.messages_to(MECHANIC.chat()).pop().unwrap();
    assert_eq!(reply.1, "You do not have administrator rights.");
}

#[tokio::test]
async fn test_demoted_admin_is_dropped_from_panel() {
    let h = harness();
    h.text(ADMIN, "/admin").await;
    h.access.remove(SUPER_ADMIN, AccessList::Admins, ADMIN).unwrap();
    h.press(ADMIN, "admin_add_mechanic").await;
    assert!(h.engine.sessions().get(ADMIN).is_none());
}

// ============================================================================
// Runtime Manager
// ============================================================================

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..500 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

fn manager_for(h: Harness, idle: Duration) -> (Arc<RuntimeManager<Arc<RecordingChannel>>>, Arc<RecordingChannel>) {
    let channel = Arc::clone(&h.channel);
    (RuntimeManager::with_idle_timeout(Arc::new(h.engine), idle), channel)
}

#[tokio::test]
async fn test_manager_preserves_per_identity_order() {
    let (manager, channel) = manager_for(harness(), Duration::from_secs(60));

    manager.dispatch(text_from(MECHANIC, "/start"));
    manager.dispatch(text_from(MECHANIC, "ab123c"));
    manager.dispatch(text_from(ADMIN, "/admin"));

    wait_until(|| channel.messages_to(MECHANIC.chat()).len() == 2).await;
    wait_until(|| !channel.messages_to(ADMIN.chat()).is_empty()).await;
    assert_eq!(manager.engine().sessions().state_of(MECHANIC), StateKind::AwaitRepairKind);
    assert_eq!(
        manager.engine().sessions().get(ADMIN).map(|s| s.state),
        Some(DialogState::AdminMenu)
    );
    assert_eq!(manager.worker_count(), 2);
}

#[tokio::test]
async fn test_idle_workers_exit_and_restart() {
    let (manager, channel) = manager_for(harness(), Duration::from_millis(50));

    manager.dispatch(text_from(MECHANIC, "/start"));
    wait_until(|| manager.worker_count() == 0).await;

    manager.dispatch(text_from(MECHANIC, "ab123c"));
    wait_until(|| channel.messages_to(MECHANIC.chat()).len() == 2).await;
    assert_eq!(manager.engine().sessions().state_of(MECHANIC), StateKind::AwaitRepairKind);
}

#[tokio::test]
async fn test_polling_retries_and_stops_on_cancel() {
    let (manager, channel) = manager_for(harness(), Duration::from_secs(60));
    let source = Arc::new(ScriptedSource::default());
    source.push(Err(ChannelError::network("connection reset")));
    source.push(Ok(vec![text_from(MECHANIC, "/start"), text_from(STRANGER, "/myid")]));

    let cancel = CancellationToken::new();
    let poller = {
        let manager = Arc::clone(&manager);
        let source = Arc::clone(&source);
        let cancel = cancel.clone();
        tokio::spawn(async move { manager.run_polling(source.as_ref(), cancel).await })
    };

    wait_until(|| channel.messages_to(STRANGER.chat()).len() == 1).await;
    wait_until(|| channel.messages_to(MECHANIC.chat()).len() == 1).await;
    assert!(source.polls.load(Ordering::SeqCst) >= 2);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), poller)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_backlogged_identity_does_not_stall_polling() {
    let (manager, channel) = manager_for(harness(), Duration::from_secs(60));
    channel.hold_sends_to(MECHANIC.chat());

    let source = Arc::new(ScriptedSource::default());
    source.push(Ok((0..100).map(|_| text_from(MECHANIC, "/start")).collect()));
    source.push(Ok(vec![text_from(STRANGER, "/myid")]));

    let cancel = CancellationToken::new();
    let poller = {
        let manager = Arc::clone(&manager);
        let source = Arc::clone(&source);
        let cancel = cancel.clone();
        tokio::spawn(async move { manager.run_polling(source.as_ref(), cancel).await })
    };

    // The mechanic's worker is parked on its first reply with the rest queued
    wait_until(|| channel.messages_to(STRANGER.chat()).len() == 1).await;
    assert!(channel.messages_to(MECHANIC.chat()).is_empty());

    channel.release_sends_to(MECHANIC.chat());
    wait_until(|| channel.messages_to(MECHANIC.chat()).len() == 100).await;

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), poller)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_sweeper_runs_until_cancelled() {
    let h = harness_with(Some(REVIEW_CHAT), Duration::ZERO);
    h.fill_report().await;
    h.press(MECHANIC, "final_confirm").await;
    let (manager, channel) = manager_for(h, Duration::from_secs(60));

    let cancel = CancellationToken::new();
    let sweeper = manager.start_sweeper(Duration::from_millis(20), cancel.clone());
    wait_until(|| manager.engine().handoffs().len() == 0).await;
    assert!(channel
        .messages_to(MECHANIC.chat())
        .iter()
        .any(|m| m.1.contains("expired")));

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), sweeper)
        .await
        .unwrap()
        .unwrap();
}
