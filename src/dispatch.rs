//! Dispatch router
//!
//! An ordered table of (state filter, event filter, access, handler) rules.
//! Rules are tried in table order and the first match wins. Events no rule
//! matches land in one of the two catch-all routes, which are explicit arms
//! of [`Route`] rather than trailing rules.

use crate::access::AccessList;
use crate::channel::{Inbound, InboundKind};
use crate::handoff::Outcome;
use crate::state_machine::{AdminAction, Event, StateKind};

/// Button payloads. Prefixed payloads carry a catalog key or handoff token.
pub mod payload {
    pub const REPAIR_KIND: &str = "type_";
    pub const LOCATION: &str = "loc_";
    pub const CATEGORY: &str = "category_";
    pub const ITEM: &str = "work_";
    pub const ACCEPT: &str = "accept_";
    pub const DECLINE: &str = "decline_";

    pub const BACK_TO_CATEGORIES: &str = "back_to_categories";
    pub const ADD_CUSTOM: &str = "add_custom";
    pub const CANCEL_CUSTOM: &str = "cancel_custom_add";
    pub const CONFIRM: &str = "confirm";
    pub const FINAL_CONFIRM: &str = "final_confirm";
    pub const RESTART: &str = "restart";
    pub const CANCEL: &str = "cancel";

    pub const ADMIN_ADD_USER: &str = "admin_add_mechanic";
    pub const ADMIN_REMOVE_USER: &str = "admin_remove_mechanic";
    pub const ADMIN_ADD_ADMIN: &str = "admin_add_admin";
    pub const ADMIN_REMOVE_ADMIN: &str = "admin_remove_admin";
    pub const ADMIN_LIST_USERS: &str = "admin_list_mechanics";
    pub const ADMIN_LIST_ADMINS: &str = "admin_list_admins";
    pub const ADMIN_SET_REVIEW_CHAT: &str = "admin_set_review_chat";
    pub const ADMIN_BACK: &str = "admin_back_to_menu";
    pub const ADMIN_EXIT: &str = "admin_exit";
}

// ============================================================================
// Rule Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFilter {
    Any,
    OneOf(&'static [StateKind]),
}

impl StateFilter {
    fn matches(self, state: StateKind) -> bool {
        match self {
            StateFilter::Any => true,
            StateFilter::OneOf(states) => states.contains(&state),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    /// `/name`, `/name@bot` or `/name args`
    Command(&'static str),
    /// Any text message
    Text,
    /// Button with exactly this payload
    Button(&'static str),
    /// Button whose payload starts with this prefix; the rest is the argument
    ButtonPrefix(&'static str),
}

impl EventFilter {
    /// The rule argument when the event matches: the text for text rules,
    /// the payload suffix for prefix rules, empty otherwise.
    fn matches(self, inbound: &Inbound) -> Option<&str> {
        match (self, &inbound.kind) {
            (EventFilter::Command(name), InboundKind::Text { text }) => {
                (command_name(text)? == name).then_some("")
            }
            (EventFilter::Text, InboundKind::Text { text }) => Some(text.as_str()),
            (EventFilter::Button(expected), InboundKind::Button { payload, .. }) => {
                (payload == expected).then_some("")
            }
            (EventFilter::ButtonPrefix(prefix), InboundKind::Button { payload, .. }) => {
                payload.strip_prefix(prefix)
            }
            _ => None,
        }
    }
}

fn command_name(text: &str) -> Option<&str> {
    let word = text.strip_prefix('/')?.split_whitespace().next()?;
    Some(word.split_once('@').map_or(word, |(name, _)| name))
}

/// Who may trigger a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Anyone,
    /// Authorized users, admins and the super-admin
    Member,
    Admin,
    /// Events from the review chat, or from a member
    Reviewer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Start,
    MyId,
    TargetId,
    RepairKind,
    Location,
    Category,
    ToggleItem,
    BackToCategories,
    AddCustomItem,
    CustomItem,
    CancelCustomItem,
    Confirm,
    FinalConfirm,
    Decide(Outcome),
    Restart,
    Cancel,
    AdminOpen,
    AdminAction(AdminAction),
    AdminList(AccessList),
    AdminInput,
    AdminBack,
    AdminExit,
}

impl Handler {
    /// The state machine event this handler feeds, given the rule argument.
    /// `MyId` and decisions do not touch the session and map to `None`.
    pub fn event(self, arg: &str) -> Option<Event> {
        let event = match self {
            Handler::Start => Event::Start,
            Handler::TargetId => Event::TargetIdEntered { text: arg.to_string() },
            Handler::RepairKind => Event::RepairKindChosen { key: arg.to_string() },
            Handler::Location => Event::LocationChosen { key: arg.to_string() },
            Handler::Category => Event::CategoryChosen { key: arg.to_string() },
            Handler::ToggleItem => Event::ItemToggled { key: arg.to_string() },
            Handler::BackToCategories => Event::BackToCategories,
            Handler::AddCustomItem => Event::AddCustomItem,
            Handler::CustomItem => Event::CustomItemEntered { text: arg.to_string() },
            Handler::CancelCustomItem => Event::CustomItemCancelled,
            Handler::Confirm => Event::Confirm,
            Handler::FinalConfirm => Event::FinalConfirm,
            Handler::Restart => Event::Restart,
            Handler::Cancel => Event::Cancel,
            Handler::AdminOpen => Event::AdminOpened,
            Handler::AdminAction(action) => Event::AdminActionChosen { action },
            Handler::AdminList(list) => Event::AdminListRequested { list },
            Handler::AdminInput => Event::AdminInput { text: arg.to_string() },
            Handler::AdminBack => Event::AdminBack,
            Handler::AdminExit => Event::AdminExit,
            Handler::MyId | Handler::Decide(_) => return None,
        };
        Some(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub state: StateFilter,
    pub event: EventFilter,
    pub access: Access,
    pub handler: Handler,
}

const fn rule(state: StateFilter, event: EventFilter, access: Access, handler: Handler) -> Rule {
    Rule {
        state,
        event,
        access,
        handler,
    }
}

const fn only(states: &'static [StateKind]) -> StateFilter {
    StateFilter::OneOf(states)
}

// ============================================================================
// Rule Table
// ============================================================================

use Access::{Admin, Anyone, Member, Reviewer};
use EventFilter::{Button, ButtonPrefix, Command, Text};
use StateFilter::Any;

pub static RULES: &[Rule] = &[
    rule(Any, Command("start"), Member, Handler::Start),
    rule(Any, Command("myid"), Anyone, Handler::MyId),
    // Report dialogue
    rule(only(&[StateKind::AwaitTargetId]), Text, Member, Handler::TargetId),
    rule(
        only(&[StateKind::AwaitRepairKind]),
        ButtonPrefix(payload::REPAIR_KIND),
        Member,
        Handler::RepairKind,
    ),
    rule(
        only(&[StateKind::AwaitLocation]),
        ButtonPrefix(payload::LOCATION),
        Member,
        Handler::Location,
    ),
    rule(
        only(&[StateKind::AwaitCategory]),
        ButtonPrefix(payload::CATEGORY),
        Member,
        Handler::Category,
    ),
    rule(
        only(&[StateKind::AwaitItemSelection]),
        ButtonPrefix(payload::ITEM),
        Member,
        Handler::ToggleItem,
    ),
    rule(
        only(&[StateKind::AwaitItemSelection]),
        Button(payload::BACK_TO_CATEGORIES),
        Member,
        Handler::BackToCategories,
    ),
    rule(
        only(&[StateKind::AwaitItemSelection]),
        Button(payload::ADD_CUSTOM),
        Member,
        Handler::AddCustomItem,
    ),
    rule(only(&[StateKind::AwaitCustomItemText]), Text, Member, Handler::CustomItem),
    rule(
        only(&[StateKind::AwaitCustomItemText]),
        Button(payload::CANCEL_CUSTOM),
        Member,
        Handler::CancelCustomItem,
    ),
    rule(
        only(&[StateKind::AwaitCategory, StateKind::AwaitItemSelection]),
        Button(payload::CONFIRM),
        Member,
        Handler::Confirm,
    ),
    rule(
        only(&[StateKind::AwaitFinalConfirm]),
        Button(payload::FINAL_CONFIRM),
        Member,
        Handler::FinalConfirm,
    ),
    // Review decisions arrive from another identity's session state
    rule(Any, ButtonPrefix(payload::ACCEPT), Reviewer, Handler::Decide(Outcome::Accepted)),
    rule(Any, ButtonPrefix(payload::DECLINE), Reviewer, Handler::Decide(Outcome::Declined)),
    // Lifecycle
    rule(Any, Button(payload::RESTART), Member, Handler::Restart),
    rule(Any, Button(payload::CANCEL), Member, Handler::Cancel),
    // Admin panel
    rule(Any, Command("admin"), Admin, Handler::AdminOpen),
    rule(
        only(&[StateKind::AdminMenu]),
        Button(payload::ADMIN_ADD_USER),
        Admin,
        Handler::AdminAction(AdminAction::AddUser),
    ),
    rule(
        only(&[StateKind::AdminMenu]),
        Button(payload::ADMIN_REMOVE_USER),
        Admin,
        Handler::AdminAction(AdminAction::RemoveUser),
    ),
    rule(
        only(&[StateKind::AdminMenu]),
        Button(payload::ADMIN_ADD_ADMIN),
        Admin,
        Handler::AdminAction(AdminAction::AddAdmin),
    ),
    rule(
        only(&[StateKind::AdminMenu]),
        Button(payload::ADMIN_REMOVE_ADMIN),
        Admin,
        Handler::AdminAction(AdminAction::RemoveAdmin),
    ),
    rule(
        only(&[StateKind::AdminMenu]),
        Button(payload::ADMIN_SET_REVIEW_CHAT),
        Admin,
        Handler::AdminAction(AdminAction::SetReviewChat),
    ),
    rule(
        only(&[StateKind::AdminMenu]),
        Button(payload::ADMIN_LIST_USERS),
        Admin,
        Handler::AdminList(AccessList::Users),
    ),
    rule(
        only(&[StateKind::AdminMenu]),
        Button(payload::ADMIN_LIST_ADMINS),
        Admin,
        Handler::AdminList(AccessList::Admins),
    ),
    rule(only(&[StateKind::AdminAwaitInput]), Text, Admin, Handler::AdminInput),
    rule(Any, Button(payload::ADMIN_BACK), Admin, Handler::AdminBack),
    rule(only(&[StateKind::AdminMenu]), Button(payload::ADMIN_EXIT), Admin, Handler::AdminExit),
];

// ============================================================================
// Routing
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Matched { rule: &'static Rule, arg: &'a str },
    /// No rule took this button press
    UnhandledButton,
    /// No rule took this text
    UnhandledText,
}

/// Pick the route for `inbound` given the actor's current state.
pub fn dispatch(state: StateKind, inbound: &Inbound) -> Route<'_> {
    for rule in RULES {
        if !rule.state.matches(state) {
            continue;
        }
        if let Some(arg) = rule.event.matches(inbound) {
            return Route::Matched { rule, arg };
        }
    }
    match inbound.kind {
        InboundKind::Button { .. } => Route::UnhandledButton,
        InboundKind::Text { .. } => Route::UnhandledText,
    }
}
