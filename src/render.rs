//! Presentation: prompts and notices to message text and buttons
//!
//! Everything here is a pure function of its arguments.

use crate::access::{AccessChange, AccessError, AccessList};
use crate::catalog::Catalog;
use crate::channel::{Actor, Button, Keyboard};
use crate::dispatch::payload;
use crate::handoff::{HandoffToken, Outcome};
use crate::identity::{ChatId, Identity};
use crate::state_machine::{AdminAction, Notice, Prompt, Report, TargetId};
use regex::Regex;
use std::fmt::Write as _;
use std::sync::OnceLock;

/// A message ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

impl Rendered {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    fn with(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }
}

// ============================================================================
// Keyboards
// ============================================================================

fn cancel_button() -> Button {
    Button::new("❌ Cancel", payload::CANCEL)
}

fn restart_keyboard() -> Keyboard {
    Keyboard::new().row([Button::new("🔄 Start a new report", payload::RESTART)])
}

fn repair_kinds_keyboard(catalog: &Catalog) -> Keyboard {
    Keyboard::new()
        .grid(
            catalog
                .repair_kinds()
                .map(|(key, name)| Button::new(name, format!("{}{key}", payload::REPAIR_KIND))),
            2,
        )
        .row([cancel_button()])
}

fn locations_keyboard(catalog: &Catalog) -> Keyboard {
    Keyboard::new()
        .grid(
            catalog
                .locations()
                .map(|(key, name)| Button::new(name, format!("{}{key}", payload::LOCATION))),
            2,
        )
        .row([cancel_button()])
}

fn categories_keyboard(catalog: &Catalog) -> Keyboard {
    Keyboard::new()
        .grid(
            catalog.categories().iter().map(|c| {
                Button::new(c.name.as_str(), format!("{}{}", payload::CATEGORY, c.key))
            }),
            2,
        )
        .row([Button::new("✅ Confirm", payload::CONFIRM)])
        .row([cancel_button()])
}

/// Items of `category` with the selected ones ticked
fn items_keyboard(catalog: &Catalog, category: &str, selected: &[String]) -> Keyboard {
    let items = catalog
        .category_by_name(category)
        .map(|c| catalog.items_of(c, selected))
        .unwrap_or_default();
    Keyboard::new()
        .grid(
            items.into_iter().map(|item| {
                let text = if item.selected {
                    format!("✅ {}", item.name)
                } else {
                    item.name.to_string()
                };
                Button::new(text, format!("{}{}", payload::ITEM, item.key))
            }),
            2,
        )
        .row([Button::new("↩️ Back to categories", payload::BACK_TO_CATEGORIES)])
        .row([Button::new("✏️ Add manually", payload::ADD_CUSTOM)])
}

fn admin_menu_keyboard() -> Keyboard {
    Keyboard::new()
        .row([
            Button::new("➕ Add mechanic", payload::ADMIN_ADD_USER),
            Button::new("➖ Remove mechanic", payload::ADMIN_REMOVE_USER),
        ])
        .row([
            Button::new("➕ Add admin", payload::ADMIN_ADD_ADMIN),
            Button::new("➖ Remove admin", payload::ADMIN_REMOVE_ADMIN),
        ])
        .row([
            Button::new("📝 Mechanics", payload::ADMIN_LIST_USERS),
            Button::new("📝 Admins", payload::ADMIN_LIST_ADMINS),
        ])
        .row([Button::new("⚙️ Set review chat", payload::ADMIN_SET_REVIEW_CHAT)])
        .row([Button::new("↩️ Exit", payload::ADMIN_EXIT)])
}

fn admin_back_keyboard() -> Keyboard {
    Keyboard::new().row([Button::new("↩️ Back", payload::ADMIN_BACK)])
}

/// Accept/Decline buttons attached to a review request
pub fn review_keyboard(token: &HandoffToken) -> Keyboard {
    Keyboard::new().row([
        Button::new("✅ Accept", format!("{}{token}", payload::ACCEPT)),
        Button::new("❌ Decline", format!("{}{token}", payload::DECLINE)),
    ])
}

// ============================================================================
// Prompts
// ============================================================================

fn summary(report: &Report) -> String {
    let mut text = format!(
        "Repair summary\n\nBike No {}\nRepair type: {}\nLocation: {}\nCompleted work:\n",
        report.target_id, report.repair_kind, report.location
    );
    for item in &report.items {
        let _ = writeln!(text, "- {item}");
    }
    text
}

fn admin_input_request(action: AdminAction) -> &'static str {
    match action {
        AdminAction::AddUser => {
            "Enter the Telegram ID of the new mechanic (a numeric ID, @userinfobot can tell it)."
        }
        AdminAction::RemoveUser => "Enter the Telegram ID of the mechanic to remove.",
        AdminAction::AddAdmin => "Enter the Telegram ID of the new administrator.",
        AdminAction::RemoveAdmin => "Enter the Telegram ID of the administrator to remove.",
        AdminAction::SetReviewChat => {
            "Enter the ID of the chat or channel reports should be sent to. It is a numeric ID, \
             @userinfobot or a similar bot can tell it."
        }
    }
}

fn listing(list: AccessList, ids: &[Identity]) -> String {
    let (title, empty) = match list {
        AccessList::Users => ("Authorized mechanics:", "There are no authorized mechanics."),
        AccessList::Admins => ("Administrators:", "There are no administrators."),
    };
    if ids.is_empty() {
        return empty.to_string();
    }
    let lines: Vec<String> = ids.iter().map(ToString::to_string).collect();
    format!("{title}\n\n{}", lines.join("\n"))
}

/// Text and buttons for a dialogue screen
pub fn prompt(prompt: &Prompt, catalog: &Catalog) -> Rendered {
    match prompt {
        Prompt::AskTargetId => Rendered::with(
            "Hi! 👋 To start, enter the bike number (ID):",
            Keyboard::new().row([cancel_button()]),
        ),
        Prompt::InvalidTargetId => Rendered::with(
            "❌ Invalid format. Example: AB123C",
            Keyboard::new().row([cancel_button()]),
        ),
        Prompt::AskRepairKind { target_id } => Rendered::with(
            format!("Bike number: {target_id}\n\nNow choose the repair type:"),
            repair_kinds_keyboard(catalog),
        ),
        Prompt::AskLocation { repair_kind } => Rendered::with(
            format!("Repair type: {repair_kind}\n\nNow choose the location:"),
            locations_keyboard(catalog),
        ),
        Prompt::AskCategory {
            location,
            repair_kind,
        } => Rendered::with(
            format!("Location: {location}\nRepair type: {repair_kind}\n\nNow choose a category:"),
            categories_keyboard(catalog),
        ),
        Prompt::NextCategory { repair_kind } => Rendered::with(
            format!("Repair type: {repair_kind}\n\nChoose the next category:"),
            categories_keyboard(catalog),
        ),
        Prompt::ItemSelection { category, selected } => Rendered::with(
            format!("Category: {category}\n\nChoose the completed work:"),
            items_keyboard(catalog, category, selected),
        ),
        Prompt::AskCustomItem => Rendered::with(
            "Type the name of the work to add and send it to me.",
            Keyboard::new().row([Button::new("❌ Cancel", payload::CANCEL_CUSTOM)]),
        ),
        Prompt::CustomItemAdded { item } => Rendered::with(
            format!("Work '{item}' added. Choose the next category or finish the report:"),
            categories_keyboard(catalog),
        ),
        Prompt::CustomItemCancelled { category, selected } => Rendered::with(
            format!("Adding work cancelled.\n\nCategory: {category}\nChoose the completed work:"),
            items_keyboard(catalog, category, selected),
        ),
        Prompt::Summary { report } => Rendered::with(
            summary(report),
            Keyboard::new().row([
                Button::new("✅ Confirm", payload::FINAL_CONFIRM),
                Button::new("❌ Cancel", payload::RESTART),
            ]),
        ),
        Prompt::Cancelled => Rendered::text("Action cancelled."),
        Prompt::NotAuthorized => Rendered::text(
            "You are not allowed to use this bot. If you are a mechanic, ask an administrator for access.",
        ),
        Prompt::NotAdmin => Rendered::text("You do not have administrator rights."),
        Prompt::UnknownInput => {
            Rendered::text("I don't understand this command. Please use the buttons or /start.")
        }
        Prompt::YourId { id } => Rendered::text(format!("Your Telegram ID: {id}")),
        Prompt::ReviewChannelMissing => Rendered::text(
            "❌ The review chat is not configured. Please ask an administrator to set it with /admin.",
        ),
        Prompt::Submitted => Rendered::with(
            "✅ Report sent to the dispatchers. They will process it shortly.",
            restart_keyboard(),
        ),
        Prompt::SubmitFailed { reason } => Rendered::with(
            format!("❌ Failed to send the report: {reason}."),
            restart_keyboard(),
        ),
        Prompt::AdminMenu { welcome } => Rendered::with(
            if *welcome {
                "Welcome to the admin panel!"
            } else {
                "Admin panel:"
            },
            admin_menu_keyboard(),
        ),
        Prompt::AdminAskInput { action } => {
            Rendered::with(admin_input_request(*action), admin_back_keyboard())
        }
        Prompt::AdminInvalidInput { action } => Rendered::text(match action {
            AdminAction::SetReviewChat => "Invalid ID format. Please enter a number.",
            _ => "Invalid ID format. Please enter digits only.",
        }),
        Prompt::AdminListing { list, ids } => {
            Rendered::with(listing(*list, ids), admin_back_keyboard())
        }
        Prompt::AdminOutcome { text } => Rendered::text(text.as_str()),
        Prompt::AdminExited => Rendered::text("You have left the admin panel."),
    }
}

/// Transient alert text
pub fn notice(notice: Notice) -> &'static str {
    match notice {
        Notice::ChoiceNotFound => "Option not found. Please try again.",
        Notice::CategoryNotFound => "Category not found. Please try again.",
        Notice::ItemNotFound => "Work item not found. Please try again.",
        Notice::EmptySelection => "Please select at least one completed work item.",
        Notice::ReportStale => "Report data not found. It may be outdated.",
        Notice::ReportAccepted => "Report accepted. The mechanic has been notified.",
        Notice::ReportDeclined => "Report declined. The mechanic has been notified.",
        Notice::ReviewNotPermitted => "You are not allowed to review reports.",
        Notice::ActionUnavailable => "This action is no longer available.",
    }
}

// ============================================================================
// Admin Outcomes
// ============================================================================

pub fn access_outcome(
    list: AccessList,
    id: Identity,
    result: &Result<AccessChange, AccessError>,
) -> String {
    match (result, list) {
        (Ok(AccessChange::Added), AccessList::Users) => format!("User {id} added."),
        (Ok(AccessChange::Added), AccessList::Admins) => {
            format!("User {id} added to the administrators.")
        }
        (Ok(AccessChange::AlreadyPresent), AccessList::Users) => {
            "This user is already authorized.".to_string()
        }
        (Ok(AccessChange::AlreadyPresent), AccessList::Admins) => {
            "This user is already an administrator.".to_string()
        }
        (Ok(AccessChange::Removed), AccessList::Users) => {
            format!("User {id} removed from the mechanics.")
        }
        (Ok(AccessChange::Removed), AccessList::Admins) => {
            format!("User {id} removed from the administrators.")
        }
        (Ok(AccessChange::NotFound), AccessList::Users) => {
            "There is no mechanic with this ID.".to_string()
        }
        (Ok(AccessChange::NotFound), AccessList::Admins) => {
            "This user is not an administrator.".to_string()
        }
        (Err(AccessError::SuperAdminProtected), _) => {
            "You cannot remove the super-admin.".to_string()
        }
        (Err(AccessError::NotPermitted), _) => {
            "You are not allowed to remove other administrators.".to_string()
        }
        (Err(AccessError::Store(e)), _) => format!("❌ Could not save the change: {e}"),
    }
}

pub fn review_chat_saved(chat: ChatId) -> String {
    format!("Review chat ID ({chat}) saved.")
}

// ============================================================================
// Review Handoff
// ============================================================================

fn emoji_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            "[",
            r"\x{2600}-\x{27BF}",
            r"\x{1F600}-\x{1F64F}",
            r"\x{1F300}-\x{1F5FF}",
            r"\x{1F680}-\x{1F6FF}",
            r"\x{1F700}-\x{1F77F}",
            r"\x{1F780}-\x{1F7FF}",
            r"\x{1F800}-\x{1F8FF}",
            r"\x{1F900}-\x{1F9FF}",
            r"\x{1FA00}-\x{1FA6F}",
            r"\x{1FA70}-\x{1FAFF}",
            r"\x{2702}-\x{27B0}",
            r"\x{24C2}-\x{1F251}",
            r"\x{2B50}",
            r"\x{1F1E6}-\x{1F1FF}",
            "]+",
        ))
        .unwrap_or_else(|e| unreachable!("static regex: {e}"))
    })
}

/// Drop emoji and surrounding whitespace; reviewers get plain item names.
pub fn strip_emoji(text: &str) -> String {
    emoji_pattern().replace_all(text, "").trim().to_string()
}

/// Message posted to the review chat for a submitted report
pub fn review_request(report: &Report, originator: &Actor) -> String {
    let items: Vec<String> = report.items.iter().map(|i| strip_emoji(i)).collect();
    format!(
        "Bike No {}\nRepair type: {}\nLocation: {}\nStatus: ready\nCompleted work: {}\nMechanic: {}",
        report.target_id,
        report.repair_kind,
        report.location,
        items.join("; "),
        originator.mention()
    )
}

/// The review request as it reads after a decision
pub fn decision_echo(original: Option<&str>, outcome: Outcome, reviewer: &Actor) -> String {
    let line = match outcome {
        Outcome::Accepted => format!("✅ Report accepted by dispatcher {}.", reviewer.first_name),
        Outcome::Declined => format!("❌ Report declined by dispatcher {}.", reviewer.first_name),
    };
    match original {
        Some(text) if !text.is_empty() => format!("{text}\n\n{line}"),
        _ => line,
    }
}

/// What the originator hears about the decision
pub fn originator_notice(outcome: Outcome, target_id: &TargetId) -> String {
    match outcome {
        Outcome::Accepted => {
            format!("🎉 The repair report for bike No {target_id} was accepted by the dispatcher.")
        }
        Outcome::Declined => format!(
            "😞 The repair report for bike No {target_id} was declined by the dispatcher. Please check the report."
        ),
    }
}

pub fn expired_notice(target_id: &TargetId) -> String {
    format!(
        "⌛ The repair report for bike No {target_id} expired without a decision. Please submit it again if it is still needed."
    )
}
