//! Event engine: access gate, transition, effect execution

use super::SessionStore;
use crate::access::AccessControl;
use crate::catalog::Catalog;
use crate::channel::{Channel, Inbound, InboundKind};
use crate::config::SettingsStore;
use crate::dispatch::{dispatch, Access, Handler, Route};
use crate::handoff::{HandoffError, HandoffRegistry, Outcome, PendingHandoff, Resolution};
use crate::render;
use crate::state_machine::{
    transition, AdminCommand, Delivery, DialogContext, Effect, Event, Notice, Prompt, Report,
};
use chrono::Utc;
use std::sync::Arc;

/// Runs handlers for inbound events against the shared collaborators.
///
/// The engine is shared by all per-identity workers. Sessions are only
/// touched for the actor of the event being handled; the handoff registry is
/// the one piece of state shared between identities.
pub struct Engine<C: Channel> {
    channel: C,
    catalog: Arc<Catalog>,
    access: AccessControl,
    settings: SettingsStore,
    handoffs: Arc<HandoffRegistry>,
    sessions: SessionStore,
}

impl<C: Channel> Engine<C> {
    pub fn new(
        channel: C,
        catalog: Arc<Catalog>,
        access: AccessControl,
        settings: SettingsStore,
        handoffs: Arc<HandoffRegistry>,
    ) -> Self {
        Self {
            channel,
            catalog,
            access,
            settings,
            handoffs,
            sessions: SessionStore::default(),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    #[allow(dead_code)] // Used in tests
    pub fn handoffs(&self) -> &HandoffRegistry {
        &self.handoffs
    }

    /// Route one inbound event and run its handler to completion.
    pub async fn handle(&self, inbound: &Inbound) {
        let identity = inbound.actor.id;
        let state = self.sessions.state_of(identity);

        match dispatch(state, inbound) {
            Route::Matched { rule, arg } => {
                tracing::debug!(identity = %identity, state = ?state, handler = ?rule.handler, "Event matched");
                if !self.admit(rule.access, inbound).await {
                    return;
                }
                match rule.handler {
                    Handler::MyId => {
                        self.show(inbound, &Prompt::YourId { id: identity }, Delivery::Reply)
                            .await;
                    }
                    Handler::Decide(outcome) => self.decide(inbound, arg, outcome).await,
                    handler => {
                        if let Some(event) = handler.event(arg) {
                            self.advance(inbound, event).await;
                        }
                    }
                }
            }
            Route::UnhandledButton => self.unhandled_button(inbound).await,
            Route::UnhandledText => self.unhandled_text(inbound).await,
        }
    }

    /// Evict expired handoffs and tell their originators.
    pub async fn sweep_expired(&self) -> usize {
        let expired = self.handoffs.sweep_expired(Utc::now());
        for (token, entry) in &expired {
            tracing::info!(
                token = %token,
                target_id = %entry.target_id,
                originator = %entry.originator,
                submitted_at = %entry.submitted_at,
                "Pending report expired"
            );
            self.notify_expired(entry).await;
        }
        expired.len()
    }

    async fn notify_expired(&self, entry: &PendingHandoff) {
        let text = render::expired_notice(&entry.target_id);
        if let Err(e) = self
            .channel
            .send_message(entry.originator.chat(), &text, None)
            .await
        {
            tracing::warn!(originator = %entry.originator, error = %e, "Failed to notify originator of expiry");
        }
    }

    // ========================================================================
    // Access Gate
    // ========================================================================

    async fn admit(&self, access: Access, inbound: &Inbound) -> bool {
        let identity = inbound.actor.id;
        match access {
            Access::Anyone => true,
            Access::Member => {
                if self.access.is_authorized(identity) {
                    return true;
                }
                tracing::info!(identity = %identity, "Rejected unauthorized identity");
                self.sessions.clear(identity);
                self.show(inbound, &Prompt::NotAuthorized, Delivery::Reply).await;
                self.acknowledge(inbound, None).await;
                false
            }
            Access::Admin => {
                if self.access.is_admin(identity) {
                    return true;
                }
                tracing::info!(identity = %identity, "Rejected admin action");
                if self.sessions.get(identity).is_some_and(|s| s.state.is_admin()) {
                    self.sessions.clear(identity);
                }
                self.show(inbound, &Prompt::NotAdmin, Delivery::Reply).await;
                self.acknowledge(inbound, None).await;
                false
            }
            Access::Reviewer => {
                let from_review_chat = self.settings.review_chat() == Some(inbound.chat);
                if from_review_chat || self.access.is_authorized(identity) {
                    return true;
                }
                tracing::info!(identity = %identity, chat = %inbound.chat, "Rejected review decision");
                self.acknowledge(inbound, Some(render::notice(Notice::ReviewNotPermitted)))
                    .await;
                false
            }
        }
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    async fn advance(&self, inbound: &Inbound, event: Event) {
        let identity = inbound.actor.id;
        let session = self.sessions.get_or_create(identity);
        let event_name = event.name();
        let ctx = DialogContext {
            catalog: &self.catalog,
        };

        match transition(&session, &ctx, event) {
            Ok(result) => {
                if result.session.state != session.state {
                    tracing::debug!(identity = %identity, from = ?session.state, to = ?result.session.state, "Session state changed");
                }
                self.sessions.store(identity, result.session);
                self.execute(inbound, result.effects).await;
            }
            Err(e) => {
                tracing::warn!(identity = %identity, event = event_name, error = %e, "Transition failed");
                match inbound.kind {
                    InboundKind::Button { .. } => self.unhandled_button(inbound).await,
                    InboundKind::Text { .. } => self.unhandled_text(inbound).await,
                }
            }
        }
    }

    async fn decide(&self, inbound: &Inbound, token: &str, outcome: Outcome) {
        let reviewer = &inbound.actor;
        let resolution = match self.handoffs.resolve(token, outcome, reviewer.id) {
            Ok(resolution) => resolution,
            Err(HandoffError::Stale) => {
                tracing::info!(token, reviewer = %reviewer.id, "Decision on stale report");
                self.acknowledge(inbound, Some(render::notice(Notice::ReportStale)))
                    .await;
                return;
            }
            Err(HandoffError::Expired(entry)) => {
                tracing::info!(
                    token,
                    reviewer = %reviewer.id,
                    originator = %entry.originator,
                    submitted_at = %entry.submitted_at,
                    "Pending report expired"
                );
                self.acknowledge(inbound, Some(render::notice(Notice::ReportStale)))
                    .await;
                self.strip_keyboard(inbound).await;
                self.notify_expired(&entry).await;
                return;
            }
        };

        let Resolution {
            entry,
            outcome,
            reviewer: reviewer_id,
        } = resolution;

        if let InboundKind::Button {
            message: Some(message),
            message_text,
            ..
        } = &inbound.kind
        {
            let text = render::decision_echo(message_text.as_deref(), outcome, reviewer);
            if let Err(e) = self.channel.edit_message(message, &text, None).await {
                tracing::warn!(error = %e, "Failed to update review request");
            }
        }

        let text = render::originator_notice(outcome, &entry.target_id);
        if let Err(e) = self
            .channel
            .send_message(entry.originator.chat(), &text, None)
            .await
        {
            tracing::error!(originator = %entry.originator, reviewer = %reviewer_id, error = %e, "Failed to notify originator of decision");
        }

        let notice = match outcome {
            Outcome::Accepted => Notice::ReportAccepted,
            Outcome::Declined => Notice::ReportDeclined,
        };
        self.acknowledge(inbound, Some(render::notice(notice))).await;
    }

    async fn unhandled_button(&self, inbound: &Inbound) {
        tracing::debug!(identity = %inbound.actor.id, "Unhandled button");
        self.acknowledge(inbound, Some(render::notice(Notice::ActionUnavailable)))
            .await;
        self.strip_keyboard(inbound).await;
    }

    async fn unhandled_text(&self, inbound: &Inbound) {
        tracing::debug!(identity = %inbound.actor.id, "Unhandled text");
        self.show(inbound, &Prompt::UnknownInput, Delivery::Reply).await;
        self.sessions.clear(inbound.actor.id);
    }

    // ========================================================================
    // Effects
    // ========================================================================

    async fn execute(&self, inbound: &Inbound, effects: Vec<Effect>) {
        let mut acknowledged = false;
        for effect in effects {
            match effect {
                Effect::Show { prompt, delivery } => self.show(inbound, &prompt, delivery).await,
                Effect::StripKeyboard => self.strip_keyboard(inbound).await,
                Effect::Alert { notice } => {
                    self.acknowledge(inbound, Some(render::notice(notice))).await;
                    acknowledged = true;
                }
                Effect::Submit { report } => self.submit(inbound, report).await,
                Effect::Admin { command } => self.run_admin(inbound, command).await,
            }
        }
        if !acknowledged {
            self.acknowledge(inbound, None).await;
        }
    }

    /// Edits fall back to a new message when the event has no source message.
    async fn show(&self, inbound: &Inbound, prompt: &Prompt, delivery: Delivery) {
        let rendered = render::prompt(prompt, &self.catalog);
        let keyboard = rendered.keyboard.as_ref();
        let result = match (delivery, inbound.source_message()) {
            (Delivery::Edit, Some(message)) => {
                self.channel
                    .edit_message(message, &rendered.text, keyboard)
                    .await
            }
            (Delivery::EditKeyboard, Some(message)) => {
                self.channel.edit_keyboard(message, keyboard).await
            }
            _ => self
                .channel
                .send_message(inbound.chat, &rendered.text, keyboard)
                .await
                .map(|_| ()),
        };
        if let Err(e) = result {
            tracing::warn!(identity = %inbound.actor.id, ?delivery, kind = ?e.kind, error = %e, "Failed to deliver prompt");
        }
    }

    async fn strip_keyboard(&self, inbound: &Inbound) {
        if let Some(message) = inbound.source_message() {
            if let Err(e) = self.channel.edit_keyboard(message, None).await {
                tracing::debug!(error = %e, "Failed to remove buttons");
            }
        }
    }

    async fn acknowledge(&self, inbound: &Inbound, alert: Option<&str>) {
        if let Some(callback_id) = inbound.callback_id() {
            if let Err(e) = self.channel.answer_button(callback_id, alert).await {
                tracing::debug!(error = %e, "Failed to answer button");
            }
        }
    }

    /// Register the report and post it to the review chat. The entry is
    /// withdrawn again if the review request cannot be delivered.
    async fn submit(&self, inbound: &Inbound, report: Report) {
        let Some(review_chat) = self.settings.review_chat() else {
            tracing::warn!(identity = %inbound.actor.id, "Submission without a review chat");
            self.show(inbound, &Prompt::ReviewChannelMissing, Delivery::Edit)
                .await;
            return;
        };

        let token = self
            .handoffs
            .submit(report.target_id.clone(), inbound.actor.id);
        let text = render::review_request(&report, &inbound.actor);
        let keyboard = render::review_keyboard(&token);

        match self
            .channel
            .send_message(review_chat, &text, Some(&keyboard))
            .await
        {
            Ok(_) => {
                self.show(inbound, &Prompt::Submitted, Delivery::Edit).await;
            }
            Err(e) => {
                self.handoffs.withdraw(&token);
                tracing::error!(token = %token, review_chat = %review_chat, error = %e, "Failed to send review request");
                let prompt = Prompt::SubmitFailed {
                    reason: e.to_string(),
                };
                self.show(inbound, &prompt, Delivery::Edit).await;
            }
        }
    }

    async fn run_admin(&self, inbound: &Inbound, command: AdminCommand) {
        let actor = inbound.actor.id;
        let text = match command {
            AdminCommand::List { list } => {
                let prompt = Prompt::AdminListing {
                    list,
                    ids: self.access.list(list),
                };
                self.show(inbound, &prompt, Delivery::Edit).await;
                return;
            }
            AdminCommand::Add { list, id } => {
                let result = self.access.add(list, id);
                if let Err(e) = &result {
                    tracing::error!(actor = %actor, ?list, identity = %id, error = %e, "Failed to add identity");
                }
                render::access_outcome(list, id, &result)
            }
            AdminCommand::Remove { list, id } => {
                let result = self.access.remove(actor, list, id);
                if let Err(e) = &result {
                    tracing::info!(actor = %actor, ?list, identity = %id, error = %e, "Removal rejected");
                }
                render::access_outcome(list, id, &result)
            }
            AdminCommand::SetReviewChat { chat } => {
                match self.settings.update(|s| s.review_chat_id = Some(chat)) {
                    Ok(()) => {
                        tracing::info!(actor = %actor, review_chat = %chat, "Review chat set");
                        render::review_chat_saved(chat)
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to save review chat");
                        format!("❌ Could not save the review chat: {e}")
                    }
                }
            }
        };
        self.show(inbound, &Prompt::AdminOutcome { text }, Delivery::Reply)
            .await;
    }
}
