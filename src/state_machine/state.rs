//! Session state types

use crate::access::AccessList;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

// ============================================================================
// Target Id
// ============================================================================

/// Identifier of the bike being reported on: two letters, three digits, one
/// letter. Always stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetId(String);

fn target_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Z]{2}[0-9]{3}[A-Z]$").unwrap_or_else(|e| unreachable!("static regex: {e}"))
    })
}

impl TargetId {
    /// Input is case-insensitive; it is upper-cased before validation.
    pub fn parse(input: &str) -> Option<Self> {
        let normalized = input.to_uppercase();
        target_id_pattern()
            .is_match(&normalized)
            .then_some(Self(normalized))
    }

    #[allow(dead_code)] // Used in tests
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Dialogue State
// ============================================================================

/// What an admin is about to type an id for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminAction {
    AddUser,
    RemoveUser,
    AddAdmin,
    RemoveAdmin,
    SetReviewChat,
}

impl AdminAction {
    /// The identity list this action edits, if any
    pub fn list(self) -> Option<AccessList> {
        match self {
            AdminAction::AddUser | AdminAction::RemoveUser => Some(AccessList::Users),
            AdminAction::AddAdmin | AdminAction::RemoveAdmin => Some(AccessList::Admins),
            AdminAction::SetReviewChat => None,
        }
    }
}

/// Where a session is in the dialogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DialogState {
    /// No dialogue in progress
    #[default]
    Idle,
    AwaitTargetId,
    AwaitRepairKind,
    AwaitLocation,
    AwaitCategory,
    AwaitItemSelection,
    AwaitCustomItemText,
    AwaitFinalConfirm,
    AdminMenu,
    AdminAwaitInput { action: AdminAction },
}

/// Field-less view of [`DialogState`] for routing predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    Idle,
    AwaitTargetId,
    AwaitRepairKind,
    AwaitLocation,
    AwaitCategory,
    AwaitItemSelection,
    AwaitCustomItemText,
    AwaitFinalConfirm,
    AdminMenu,
    AdminAwaitInput,
}

impl DialogState {
    pub fn kind(&self) -> StateKind {
        match self {
            DialogState::Idle => StateKind::Idle,
            DialogState::AwaitTargetId => StateKind::AwaitTargetId,
            DialogState::AwaitRepairKind => StateKind::AwaitRepairKind,
            DialogState::AwaitLocation => StateKind::AwaitLocation,
            DialogState::AwaitCategory => StateKind::AwaitCategory,
            DialogState::AwaitItemSelection => StateKind::AwaitItemSelection,
            DialogState::AwaitCustomItemText => StateKind::AwaitCustomItemText,
            DialogState::AwaitFinalConfirm => StateKind::AwaitFinalConfirm,
            DialogState::AdminMenu => StateKind::AdminMenu,
            DialogState::AdminAwaitInput { .. } => StateKind::AdminAwaitInput,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, DialogState::AdminMenu | DialogState::AdminAwaitInput { .. })
    }
}

// ============================================================================
// Draft Record
// ============================================================================

/// The report being assembled
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub target_id: Option<TargetId>,
    pub repair_kind: Option<String>,
    pub location: Option<String>,
    /// Selection order is preserved; presence means selected.
    pub selected_items: Vec<String>,
    /// Category whose items are on screen
    pub current_category: Option<String>,
}

impl Draft {
    /// Flip membership of `item`. Returns whether it is selected afterwards.
    pub fn toggle(&mut self, item: &str) -> bool {
        if let Some(pos) = self.selected_items.iter().position(|s| s == item) {
            self.selected_items.remove(pos);
            false
        } else {
            self.selected_items.push(item.to_string());
            true
        }
    }

    /// A finished report, if every field has been filled in
    pub fn report(&self) -> Option<Report> {
        if self.selected_items.is_empty() {
            return None;
        }
        Some(Report {
            target_id: self.target_id.clone()?,
            repair_kind: self.repair_kind.clone()?,
            location: self.location.clone()?,
            items: self.selected_items.clone(),
        })
    }
}

/// A complete record ready for review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub target_id: TargetId,
    pub repair_kind: String,
    pub location: String,
    pub items: Vec<String>,
}

// ============================================================================
// Session
// ============================================================================

/// Per-identity dialogue state plus draft
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub state: DialogState,
    pub draft: Draft,
}

impl Session {
    pub fn in_state(state: DialogState) -> Self {
        Self {
            state,
            draft: Draft::default(),
        }
    }

    /// Same draft, different state
    pub fn moved_to(&self, state: DialogState) -> Self {
        Self {
            state,
            draft: self.draft.clone(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == DialogState::Idle
    }
}
