//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::state::Draft;
use super::transition::TransitionError;
use super::*;
use crate::catalog::Catalog;
use proptest::prelude::*;
use std::collections::HashSet;

// ============================================================================
// Test Helpers
// ============================================================================

fn catalog() -> &'static Catalog {
    static CATALOG: std::sync::OnceLock<Catalog> = std::sync::OnceLock::new();
    CATALOG.get_or_init(Catalog::default)
}

fn ctx() -> DialogContext<'static> {
    DialogContext { catalog: catalog() }
}

fn item_count() -> usize {
    catalog().item_names().len()
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_item_key() -> impl Strategy<Value = String> {
    (0..item_count()).prop_map(|i| format!("w{i}"))
}

fn arb_selection() -> impl Strategy<Value = Vec<String>> {
    proptest::sample::subsequence(catalog().item_names().to_vec(), 0..8).prop_shuffle()
}

fn arb_report_state() -> impl Strategy<Value = DialogState> {
    prop_oneof![
        Just(DialogState::Idle),
        Just(DialogState::AwaitTargetId),
        Just(DialogState::AwaitRepairKind),
        Just(DialogState::AwaitLocation),
        Just(DialogState::AwaitCategory),
        Just(DialogState::AwaitItemSelection),
        Just(DialogState::AwaitCustomItemText),
        Just(DialogState::AwaitFinalConfirm),
    ]
}

/// Button and text events a mechanic can produce, catalog keys only
fn arb_event() -> impl Strategy<Value = Event> {
    let categories = catalog().categories().len();
    prop_oneof![
        1 => Just(Event::Start),
        1 => Just(Event::Cancel),
        2 => "[a-zA-Z0-9]{0,7}".prop_map(|text| Event::TargetIdEntered { text }),
        2 => (0..3usize).prop_map(|i| Event::RepairKindChosen { key: format!("k{i}") }),
        2 => (0..3usize).prop_map(|i| Event::LocationChosen { key: format!("l{i}") }),
        3 => (0..=categories).prop_map(|i| Event::CategoryChosen { key: format!("c{i}") }),
        5 => arb_item_key().prop_map(|key| Event::ItemToggled { key }),
        1 => Just(Event::BackToCategories),
        1 => Just(Event::AddCustomItem),
        1 => Just(Event::CustomItemCancelled),
        2 => Just(Event::Confirm),
        2 => Just(Event::FinalConfirm),
    ]
}

fn session_with(state: DialogState, selected: Vec<String>) -> Session {
    let mut session = Session::in_state(state);
    session.draft.target_id = TargetId::parse("AB123C");
    session.draft.repair_kind = Some("Quick repair".into());
    session.draft.location = Some("Workshop 1".into());
    session.draft.current_category = catalog().categories().first().map(|c| c.name.clone());
    session.draft.selected_items = selected;
    session
}

fn has_duplicates(items: &[String]) -> bool {
    let mut seen = HashSet::new();
    items.iter().any(|i| !seen.insert(i))
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Toggling the same item twice is the identity on the selection
    #[test]
    fn prop_toggle_is_an_involution(selected in arb_selection(), key in arb_item_key()) {
        let session = session_with(DialogState::AwaitItemSelection, selected.clone());
        let once = transition(&session, &ctx(), Event::ItemToggled { key: key.clone() }).unwrap();
        let twice = transition(&once.session, &ctx(), Event::ItemToggled { key: key.clone() }).unwrap();

        let item = catalog().resolve_item(&key).unwrap().to_string();
        let was_selected = selected.contains(&item);
        prop_assert_eq!(once.session.draft.selected_items.contains(&item), !was_selected);

        // Same set either way; a re-selected item moves to the end
        let mut expected = selected.clone();
        let mut actual = twice.session.draft.selected_items.clone();
        expected.sort();
        actual.sort();
        prop_assert_eq!(actual, expected);
        if !was_selected {
            prop_assert_eq!(&twice.session.draft.selected_items, &selected);
        }
        prop_assert_eq!(twice.session.state, DialogState::AwaitItemSelection);
    }

    // Confirm on an empty selection never moves and never publishes
    #[test]
    fn prop_empty_confirm_is_inert(in_items in any::<bool>()) {
        let state = if in_items { DialogState::AwaitItemSelection } else { DialogState::AwaitCategory };
        let session = session_with(state, vec![]);
        let result = transition(&session, &ctx(), Event::Confirm).unwrap();

        prop_assert_eq!(&result.session, &session);
        let submitted = result.effects.iter().any(|e| matches!(e, Effect::Submit { .. }));
        prop_assert!(!submitted);
        prop_assert_eq!(result.effects, vec![Effect::alert(Notice::EmptySelection)]);
    }

    // Catalog-only selections never hold duplicates, submissions only leave
    // AwaitFinalConfirm and always clear the session
    #[test]
    fn prop_sequences_preserve_invariants(
        start in arb_report_state(),
        events in proptest::collection::vec(arb_event(), 0..40),
    ) {
        let mut session = session_with(start, vec![catalog().item_names()[0].clone()]);

        for event in events {
            let before = session.state;
            match transition(&session, &ctx(), event) {
                Ok(result) => {
                    let submitted = result.effects.iter().filter(|e| matches!(e, Effect::Submit { .. })).count();
                    if submitted > 0 {
                        prop_assert_eq!(submitted, 1);
                        prop_assert_eq!(before, DialogState::AwaitFinalConfirm);
                        prop_assert!(result.session.is_idle());
                    }
                    if let Some(Effect::Submit { report }) = result.effects.first() {
                        prop_assert!(!report.items.is_empty());
                    }
                    session = result.session;
                    prop_assert!(!has_duplicates(&session.draft.selected_items));
                    if session.is_idle() {
                        prop_assert_eq!(&session.draft, &Draft::default());
                    }
                }
                Err(TransitionError::NoTransition { state, .. }) => {
                    prop_assert_eq!(state, before.kind());
                }
                Err(e) => prop_assert!(false, "unexpected error {e}"),
            }
        }
    }

    // Whatever state a dialogue is in, cancel returns it to idle with nothing kept
    #[test]
    fn prop_cancel_always_clears(start in arb_report_state(), selected in arb_selection()) {
        let session = session_with(start, selected);
        let result = transition(&session, &ctx(), Event::Cancel).unwrap();
        prop_assert_eq!(result.session, Session::default());
        let submitted = result.effects.iter().any(|e| matches!(e, Effect::Submit { .. }));
        prop_assert!(!submitted);
    }
}
