//! Events that drive a session

use super::state::AdminAction;
use crate::access::AccessList;

/// Inbound events after routing, with button payload keys still unresolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // Dialogue lifecycle
    Start,
    Restart,
    Cancel,

    // Report dialogue
    TargetIdEntered { text: String },
    RepairKindChosen { key: String },
    LocationChosen { key: String },
    CategoryChosen { key: String },
    ItemToggled { key: String },
    BackToCategories,
    AddCustomItem,
    CustomItemEntered { text: String },
    CustomItemCancelled,
    Confirm,
    FinalConfirm,

    // Admin panel
    AdminOpened,
    AdminActionChosen { action: AdminAction },
    AdminListRequested { list: AccessList },
    AdminInput { text: String },
    AdminBack,
    AdminExit,
}

impl Event {
    /// Short name for logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            Event::Start => "start",
            Event::Restart => "restart",
            Event::Cancel => "cancel",
            Event::TargetIdEntered { .. } => "target_id_entered",
            Event::RepairKindChosen { .. } => "repair_kind_chosen",
            Event::LocationChosen { .. } => "location_chosen",
            Event::CategoryChosen { .. } => "category_chosen",
            Event::ItemToggled { .. } => "item_toggled",
            Event::BackToCategories => "back_to_categories",
            Event::AddCustomItem => "add_custom_item",
            Event::CustomItemEntered { .. } => "custom_item_entered",
            Event::CustomItemCancelled => "custom_item_cancelled",
            Event::Confirm => "confirm",
            Event::FinalConfirm => "final_confirm",
            Event::AdminOpened => "admin_opened",
            Event::AdminActionChosen { .. } => "admin_action_chosen",
            Event::AdminListRequested { .. } => "admin_list_requested",
            Event::AdminInput { .. } => "admin_input",
            Event::AdminBack => "admin_back",
            Event::AdminExit => "admin_exit",
        }
    }
}
