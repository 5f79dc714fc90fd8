//! Effects produced by state transitions

use super::state::{AdminAction, Report, TargetId};
use crate::access::AccessList;
use crate::identity::{ChatId, Identity};

/// How a prompt reaches the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Send a new message
    Reply,
    /// Replace text and buttons of the message the button was pressed on
    Edit,
    /// Replace only the buttons of that message
    EditKeyboard,
}

/// A screen of the dialogue. Rendering to text and buttons happens in
/// [`crate::render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    AskTargetId,
    InvalidTargetId,
    AskRepairKind { target_id: TargetId },
    AskLocation { repair_kind: String },
    AskCategory { location: String, repair_kind: String },
    NextCategory { repair_kind: String },
    ItemSelection { category: String, selected: Vec<String> },
    AskCustomItem,
    CustomItemAdded { item: String },
    CustomItemCancelled { category: String, selected: Vec<String> },
    Summary { report: Report },
    Cancelled,

    // Produced by the runtime
    NotAuthorized,
    NotAdmin,
    UnknownInput,
    YourId { id: Identity },
    ReviewChannelMissing,
    Submitted,
    SubmitFailed { reason: String },

    // Admin panel
    AdminMenu { welcome: bool },
    AdminAskInput { action: AdminAction },
    AdminInvalidInput { action: AdminAction },
    AdminListing { list: AccessList, ids: Vec<Identity> },
    AdminOutcome { text: String },
    AdminExited,
}

/// Transient alert shown only to the actor who pressed a button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    ChoiceNotFound,
    CategoryNotFound,
    ItemNotFound,
    EmptySelection,
    ReportStale,
    ReportAccepted,
    ReportDeclined,
    ReviewNotPermitted,
    ActionUnavailable,
}

/// Admin panel commands that touch persisted lists or settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    Add { list: AccessList, id: Identity },
    Remove { list: AccessList, id: Identity },
    SetReviewChat { chat: ChatId },
    List { list: AccessList },
}

/// Effects to be executed after a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Show { prompt: Prompt, delivery: Delivery },

    /// Remove the buttons from the message the event came from
    StripKeyboard,

    Alert { notice: Notice },

    /// Publish a finished report for review
    Submit { report: Report },

    Admin { command: AdminCommand },
}

impl Effect {
    pub fn reply(prompt: Prompt) -> Self {
        Effect::Show {
            prompt,
            delivery: Delivery::Reply,
        }
    }

    pub fn edit(prompt: Prompt) -> Self {
        Effect::Show {
            prompt,
            delivery: Delivery::Edit,
        }
    }

    pub fn edit_keyboard(prompt: Prompt) -> Self {
        Effect::Show {
            prompt,
            delivery: Delivery::EditKeyboard,
        }
    }

    pub fn alert(notice: Notice) -> Self {
        Effect::Alert { notice }
    }
}
