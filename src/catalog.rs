//! Selection catalog
//!
//! Static taxonomy of repair kinds, locations and categories of work items,
//! plus the short keys embedded in button payloads. Keys are derived from
//! ordinal position, so the mapping is a bijection by construction and is
//! identical across restarts for the same catalog.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

const CATEGORY_PREFIX: char = 'c';
const ITEM_PREFIX: char = 'w';
const KIND_PREFIX: char = 'k';
const LOCATION_PREFIX: char = 'l';

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catalog: {0}")]
    Json(#[from] serde_json::Error),
    #[error("catalog has no {0}")]
    Empty(&'static str),
    #[error("duplicate category {0:?}")]
    DuplicateCategory(String),
}

/// On-disk catalog layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFile {
    pub repair_kinds: Vec<String>,
    pub locations: Vec<String>,
    pub categories: Vec<CategoryFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryFile {
    pub name: String,
    pub items: Vec<String>,
}

/// A category with its items in display order
#[derive(Debug, Clone)]
pub struct Category {
    pub key: String,
    pub name: String,
    /// Indices into the catalog's distinct item table
    items: Vec<usize>,
}

/// Something a key can resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry<'a> {
    Category(&'a str),
    Item(&'a str),
    RepairKind(&'a str),
    Location(&'a str),
}

/// A catalog item as shown in a category listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemView<'a> {
    pub key: String,
    pub name: &'a str,
    pub selected: bool,
}

/// Immutable after construction
#[derive(Debug, Clone)]
pub struct Catalog {
    repair_kinds: Vec<String>,
    locations: Vec<String>,
    categories: Vec<Category>,
    /// Distinct item names in first-appearance order; the index is the key.
    items: Vec<String>,
    item_index: HashMap<String, usize>,
}

impl Catalog {
    pub fn from_file_contents(file: CatalogFile) -> Result<Self, CatalogError> {
        if file.repair_kinds.is_empty() {
            return Err(CatalogError::Empty("repair kinds"));
        }
        if file.locations.is_empty() {
            return Err(CatalogError::Empty("locations"));
        }
        if file.categories.is_empty() {
            return Err(CatalogError::Empty("categories"));
        }

        let mut seen_categories = HashSet::new();
        let mut items = Vec::new();
        let mut item_index: HashMap<String, usize> = HashMap::new();
        let mut categories = Vec::with_capacity(file.categories.len());

        for (ordinal, category) in file.categories.into_iter().enumerate() {
            if !seen_categories.insert(category.name.clone()) {
                return Err(CatalogError::DuplicateCategory(category.name));
            }
            let mut members = Vec::with_capacity(category.items.len());
            for name in category.items {
                // The same item may be listed under several categories; it keeps
                // the key of its first appearance.
                let index = *item_index.entry(name.clone()).or_insert_with(|| {
                    items.push(name);
                    items.len() - 1
                });
                if !members.contains(&index) {
                    members.push(index);
                }
            }
            categories.push(Category {
                key: format!("{CATEGORY_PREFIX}{ordinal}"),
                name: category.name,
                items: members,
            });
        }

        Ok(Self {
            repair_kinds: file.repair_kinds,
            locations: file.locations,
            categories,
            items,
            item_index,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_file_contents(serde_json::from_str(&raw)?)
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// `(key, name)` pairs in display order
    pub fn repair_kinds(&self) -> impl Iterator<Item = (String, &str)> {
        self.repair_kinds
            .iter()
            .enumerate()
            .map(|(i, name)| (format!("{KIND_PREFIX}{i}"), name.as_str()))
    }

    /// `(key, name)` pairs in display order
    pub fn locations(&self) -> impl Iterator<Item = (String, &str)> {
        self.locations
            .iter()
            .enumerate()
            .map(|(i, name)| (format!("{LOCATION_PREFIX}{i}"), name.as_str()))
    }

    /// Key for a catalog item by name. Free-text items have no key.
    pub fn item_key(&self, name: &str) -> Option<String> {
        self.item_index
            .get(name)
            .map(|i| format!("{ITEM_PREFIX}{i}"))
    }

    pub fn category_by_name(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Resolve any key back to its entry.
    pub fn resolve(&self, key: &str) -> Option<Entry<'_>> {
        let mut chars = key.chars();
        let prefix = chars.next()?;
        let ordinal = parse_ordinal(chars.as_str())?;
        match prefix {
            CATEGORY_PREFIX => self
                .categories
                .get(ordinal)
                .map(|c| Entry::Category(c.name.as_str())),
            ITEM_PREFIX => self.items.get(ordinal).map(|n| Entry::Item(n.as_str())),
            KIND_PREFIX => self
                .repair_kinds
                .get(ordinal)
                .map(|n| Entry::RepairKind(n.as_str())),
            LOCATION_PREFIX => self
                .locations
                .get(ordinal)
                .map(|n| Entry::Location(n.as_str())),
            _ => None,
        }
    }

    pub fn resolve_category(&self, key: &str) -> Option<&Category> {
        match self.resolve(key)? {
            Entry::Category(name) => self.category_by_name(name),
            _ => None,
        }
    }

    pub fn resolve_item(&self, key: &str) -> Option<&str> {
        match self.resolve(key)? {
            Entry::Item(name) => Some(name),
            _ => None,
        }
    }

    pub fn resolve_repair_kind(&self, key: &str) -> Option<&str> {
        match self.resolve(key)? {
            Entry::RepairKind(name) => Some(name),
            _ => None,
        }
    }

    pub fn resolve_location(&self, key: &str) -> Option<&str> {
        match self.resolve(key)? {
            Entry::Location(name) => Some(name),
            _ => None,
        }
    }

    /// Items of `category` in display order, flagged against the current selection
    pub fn items_of<'a>(&'a self, category: &Category, selected: &[String]) -> Vec<ItemView<'a>> {
        category
            .items
            .iter()
            .map(|&i| {
                let name = self.items[i].as_str();
                ItemView {
                    key: format!("{ITEM_PREFIX}{i}"),
                    name,
                    selected: selected.iter().any(|s| s == name),
                }
            })
            .collect()
    }

    /// Every distinct item name, in key order
    pub fn item_names(&self) -> &[String] {
        &self.items
    }
}

/// Canonical decimal only: no sign, no leading zeros, so each ordinal has
/// exactly one spelling.
fn parse_ordinal(s: &str) -> Option<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) || (s.len() > 1 && s.starts_with('0'))
    {
        return None;
    }
    s.parse().ok()
}

impl Default for Catalog {
    fn default() -> Self {
        Self::from_file_contents(default_catalog())
            .unwrap_or_else(|e| unreachable!("built-in catalog is valid: {e}"))
    }
}

fn category(name: &str, items: &[&str]) -> CategoryFile {
    CategoryFile {
        name: name.to_string(),
        items: items.iter().map(|s| (*s).to_string()).collect(),
    }
}

/// The bike workshop catalog the bot ships with
pub fn default_catalog() -> CatalogFile {
    CatalogFile {
        repair_kinds: vec!["Quick repair".to_string(), "Ready for pickup".to_string()],
        locations: vec!["Workshop 1".to_string(), "Workshop 2".to_string()],
        categories: vec![
            category(
                "🛠️ Frequent repairs",
                &[
                    "🛞 Front wheel", "🩹 Inner tube", "⚙️ Hub motor", "⚙️ Rear sprocket",
                    "⚙️ Front bearing", "🛑 Brake pads (rear)", "🛑 Brake pads (front)",
                    "🔗 Brake cable (rear)", "🔗 Brake cable (front)", "🪞 Mirror (L)",
                    "🪞 Mirror (R)", "💧 Bottle holder", "📱 Throttle sensor", "📎 Rack clamp",
                ],
            ),
            category(
                "⚙️ Wheels and brakes",
                &[
                    "🔗 Brake cable (rear)", "🔗 Brake cable (front)", "🛞 Front wheel",
                    "⚡️ Hub motor", "🛑 Brake pads (front)", "🛑 Brake pads (rear)",
                    "💿 Front disc", "🥁 Front wheel drum", "⚙️ Front bearing",
                    "⚙️ Rear bearing", "⚙️ Rear sprocket", "🩹 Inner tube", "🚲 Tyre",
                ],
            ),
            category(
                "⚡️ Electrics",
                &[
                    "💨 Throttle trigger", "🖥️ Display", "🎛️ Controller", "🔒 Battery lock",
                    "🔌 USB port", "💡 Headlight", "➡️ Indicator (R)", "⬅️ Indicator (L)",
                    "🔋 Battery cell 2", "🔌 Wiring", "🔔 Buzzer", "🔌 Socket",
                    "⚡️ Charging cable", "🔴 Rear light", "🛡️ Rear light guard plate",
                ],
            ),
            category(
                "🚲 Frame and fittings",
                &[
                    "📱 Throttle sensor", "📎 Rack clamp", "💧 Bottle holder", "🪞 Mirror (R)",
                    "🪞 Mirror (L)", "🦵 Kickstand", "🛡️ Front mudguard", "🛡️ Rear mudguard",
                    "🆔 Number plate", "🦶 Footrest (R)", "🦶 Footrest (L)", "🔒 Seat lock",
                    "🪑 Seat", "🛡️ Chain guard", "🧳 Rear rack", "💡 Headlight cover",
                    "📢 Advertising banner (R)", "📢 Advertising banner (L)", "🧳 Front rack",
                    "🔋 Battery guide rail", "🔋 Battery bay top cover",
                    "🔋 Battery holder (platform)", "🛹 Deck", "🔒 Seat lock inner bracket",
                    "🤖 IoT rear cover", "🤖 IoT side holder plate", "💡 IoT reflector",
                    "⚓️ Anchor", "🔒 Seat lock cover", "🛡️ Motor anti-twist guard",
                    "⛓️ Chain tensioner", "🧳 Rear rack shelf",
                ],
            ),
            category(
                "⛓️ Drivetrain and bearings",
                &[
                    "⚙️ Rear sprocket", "🦶 Pedal (L)", "🦶 Pedal (R)", "⛓️ Chain",
                    "🔧 Crank replacement", "🔒 Chain lock", "⚙️ Bottom bracket",
                    "⚙️ Front bearing", "⚙️ Rear bearing", "⚙️ Fork bearing",
                ],
            ),
            category(
                "🎛️ Steering",
                &[
                    "🍴 Fork", "✋ Brake lever (L)", "✋ Brake lever (R)", "⚙️ Head tube cup",
                    "🕹️ Handlebar", "🛡️ Upper handlebar cover", "🛡️ Lower handlebar cover",
                    "🤚 Grip (R)", "🤚 Grip (L)", "🕳️ Grip plug", "📎 Handlebar clamp",
                    "⚙️ Fork crown race", "🎛️ Control panel",
                ],
            ),
            category(
                "🔧 Other",
                &[
                    "🩹 Patch", "📶 SIM", "🔌 PSU plastic spacer (inner)",
                    "🔌 PSU plastic spacer (outer)",
                ],
            ),
        ],
    }
}
