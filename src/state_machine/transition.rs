//! Pure state transition function

use super::{
    AdminAction, AdminCommand, DialogState, Effect, Event, Notice, Prompt, Session, StateKind,
    TargetId,
};
use crate::catalog::Catalog;
use crate::identity::{ChatId, Identity};
use thiserror::Error;

/// Read-only inputs a transition may consult
#[derive(Debug, Clone, Copy)]
pub struct DialogContext<'a> {
    pub catalog: &'a Catalog,
}

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub session: Session,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("no transition from {state:?} on {event}")]
    NoTransition {
        state: StateKind,
        event: &'static str,
    },
    #[error("draft is incomplete in {0:?}")]
    IncompleteDraft(StateKind),
}

/// Pure transition function
///
/// Given the same session, catalog and event it always produces the same
/// result and performs no I/O.
#[allow(clippy::too_many_lines)]
pub fn transition(
    session: &Session,
    ctx: &DialogContext<'_>,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    let unchanged = || TransitionResult::new(session.clone());

    match (session.state, event) {
        // ============================================================
        // Lifecycle (valid from any state)
        // ============================================================
        (_, Event::Start) => Ok(TransitionResult::new(Session::in_state(
            DialogState::AwaitTargetId,
        ))
        .with_effect(Effect::reply(Prompt::AskTargetId))),

        (_, Event::Restart) => Ok(TransitionResult::new(Session::in_state(
            DialogState::AwaitTargetId,
        ))
        .with_effect(Effect::StripKeyboard)
        .with_effect(Effect::reply(Prompt::AskTargetId))),

        (_, Event::Cancel) => {
            Ok(TransitionResult::new(Session::default()).with_effect(Effect::edit(Prompt::Cancelled)))
        }

        // ============================================================
        // Report dialogue
        // ============================================================
        (DialogState::AwaitTargetId, Event::TargetIdEntered { text }) => {
            match TargetId::parse(&text) {
                Some(target_id) => {
                    let mut next = session.moved_to(DialogState::AwaitRepairKind);
                    next.draft.target_id = Some(target_id.clone());
                    Ok(TransitionResult::new(next)
                        .with_effect(Effect::reply(Prompt::AskRepairKind { target_id })))
                }
                None => Ok(unchanged().with_effect(Effect::reply(Prompt::InvalidTargetId))),
            }
        }

        (DialogState::AwaitRepairKind, Event::RepairKindChosen { key }) => {
            let Some(kind) = ctx.catalog.resolve_repair_kind(&key) else {
                return Ok(unchanged().with_effect(Effect::alert(Notice::ChoiceNotFound)));
            };
            let mut next = session.moved_to(DialogState::AwaitLocation);
            next.draft.repair_kind = Some(kind.to_string());
            next.draft.selected_items.clear();
            Ok(TransitionResult::new(next).with_effect(Effect::edit(Prompt::AskLocation {
                repair_kind: kind.to_string(),
            })))
        }

        (DialogState::AwaitLocation, Event::LocationChosen { key }) => {
            let Some(location) = ctx.catalog.resolve_location(&key) else {
                return Ok(unchanged().with_effect(Effect::alert(Notice::ChoiceNotFound)));
            };
            let mut next = session.moved_to(DialogState::AwaitCategory);
            next.draft.location = Some(location.to_string());
            Ok(TransitionResult::new(next).with_effect(Effect::edit(Prompt::AskCategory {
                location: location.to_string(),
                repair_kind: session.draft.repair_kind.clone().unwrap_or_default(),
            })))
        }

        (DialogState::AwaitCategory, Event::CategoryChosen { key }) => {
            let Some(category) = ctx.catalog.resolve_category(&key) else {
                return Ok(unchanged().with_effect(Effect::alert(Notice::CategoryNotFound)));
            };
            let mut next = session.moved_to(DialogState::AwaitItemSelection);
            next.draft.current_category = Some(category.name.clone());
            let selected = next.draft.selected_items.clone();
            Ok(TransitionResult::new(next).with_effect(Effect::edit(Prompt::ItemSelection {
                category: category.name.clone(),
                selected,
            })))
        }

        (DialogState::AwaitItemSelection, Event::ItemToggled { key }) => {
            let Some(item) = ctx.catalog.resolve_item(&key) else {
                return Ok(unchanged().with_effect(Effect::alert(Notice::ItemNotFound)));
            };
            let mut next = session.clone();
            next.draft.toggle(item);
            let prompt = Prompt::ItemSelection {
                category: next.draft.current_category.clone().unwrap_or_default(),
                selected: next.draft.selected_items.clone(),
            };
            Ok(TransitionResult::new(next).with_effect(Effect::edit_keyboard(prompt)))
        }

        (DialogState::AwaitItemSelection, Event::BackToCategories) => Ok(TransitionResult::new(
            session.moved_to(DialogState::AwaitCategory),
        )
        .with_effect(Effect::edit(Prompt::NextCategory {
            repair_kind: session.draft.repair_kind.clone().unwrap_or_default(),
        }))),

        (DialogState::AwaitItemSelection, Event::AddCustomItem) => Ok(TransitionResult::new(
            session.moved_to(DialogState::AwaitCustomItemText),
        )
        .with_effect(Effect::edit(Prompt::AskCustomItem))),

        // Free text is taken verbatim: no trimming, no de-duplication.
        (DialogState::AwaitCustomItemText, Event::CustomItemEntered { text }) => {
            let mut next = session.moved_to(DialogState::AwaitCategory);
            next.draft.selected_items.push(text.clone());
            Ok(TransitionResult::new(next)
                .with_effect(Effect::reply(Prompt::CustomItemAdded { item: text })))
        }

        (DialogState::AwaitCustomItemText, Event::CustomItemCancelled) => Ok(TransitionResult::new(
            session.moved_to(DialogState::AwaitItemSelection),
        )
        .with_effect(Effect::edit(Prompt::CustomItemCancelled {
            category: session.draft.current_category.clone().unwrap_or_default(),
            selected: session.draft.selected_items.clone(),
        }))),

        (DialogState::AwaitCategory | DialogState::AwaitItemSelection, Event::Confirm) => {
            if session.draft.selected_items.is_empty() {
                return Ok(unchanged().with_effect(Effect::alert(Notice::EmptySelection)));
            }
            let report = session
                .draft
                .report()
                .ok_or(TransitionError::IncompleteDraft(session.state.kind()))?;
            Ok(
                TransitionResult::new(session.moved_to(DialogState::AwaitFinalConfirm))
                    .with_effect(Effect::edit(Prompt::Summary { report })),
            )
        }

        // Submission ends the dialogue whatever happens downstream.
        (DialogState::AwaitFinalConfirm, Event::FinalConfirm) => {
            let report = session
                .draft
                .report()
                .ok_or(TransitionError::IncompleteDraft(StateKind::AwaitFinalConfirm))?;
            Ok(TransitionResult::new(Session::default()).with_effect(Effect::Submit { report }))
        }

        // ============================================================
        // Admin panel
        // ============================================================
        (_, Event::AdminOpened) => Ok(TransitionResult::new(Session::in_state(
            DialogState::AdminMenu,
        ))
        .with_effect(Effect::reply(Prompt::AdminMenu { welcome: true }))),

        (_, Event::AdminBack) => Ok(TransitionResult::new(Session::in_state(
            DialogState::AdminMenu,
        ))
        .with_effect(Effect::edit(Prompt::AdminMenu { welcome: false }))),

        (DialogState::AdminMenu, Event::AdminActionChosen { action }) => Ok(TransitionResult::new(
            Session::in_state(DialogState::AdminAwaitInput { action }),
        )
        .with_effect(Effect::edit(Prompt::AdminAskInput { action }))),

        (DialogState::AdminMenu, Event::AdminListRequested { list }) => Ok(unchanged()
            .with_effect(Effect::Admin {
                command: AdminCommand::List { list },
            })),

        (DialogState::AdminAwaitInput { action }, Event::AdminInput { text }) => {
            match parse_admin_input(action, &text) {
                Some(command) => Ok(TransitionResult::new(Session::in_state(
                    DialogState::AdminMenu,
                ))
                .with_effect(Effect::Admin { command })
                .with_effect(Effect::reply(Prompt::AdminMenu { welcome: false }))),
                None => Ok(unchanged().with_effect(Effect::reply(Prompt::AdminInvalidInput { action }))),
            }
        }

        (DialogState::AdminMenu, Event::AdminExit) => {
            Ok(TransitionResult::new(Session::default()).with_effect(Effect::edit(Prompt::AdminExited)))
        }

        // ============================================================
        // Invalid Transitions
        // ============================================================
        (state, event) => Err(TransitionError::NoTransition {
            state: state.kind(),
            event: event.name(),
        }),
    }
}

fn parse_admin_input(action: AdminAction, text: &str) -> Option<AdminCommand> {
    match action {
        AdminAction::AddUser | AdminAction::AddAdmin => {
            let id: Identity = text.parse().ok()?;
            Some(AdminCommand::Add {
                list: action.list()?,
                id,
            })
        }
        AdminAction::RemoveUser | AdminAction::RemoveAdmin => {
            let id: Identity = text.parse().ok()?;
            Some(AdminCommand::Remove {
                list: action.list()?,
                id,
            })
        }
        AdminAction::SetReviewChat => {
            let chat: ChatId = text.parse().ok()?;
            Some(AdminCommand::SetReviewChat { chat })
        }
    }
}
