//! Process configuration and persisted bot settings

use crate::identity::{ChatId, Identity};
use crate::store::JsonStore;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";
const DEFAULT_HANDOFF_TTL_HOURS: u64 = 168;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Configuration read once at startup
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub bot_token: String,
    /// Always authorized and admin; cannot be removed from the admin list.
    pub super_admin: Identity,
    pub data_dir: PathBuf,
    /// Optional JSON catalog replacing the built-in one
    pub catalog_path: Option<PathBuf>,
    /// How long a submitted report waits for a reviewer decision
    pub handoff_ttl: Duration,
    pub api_url: String,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bot_token = lookup("REPAIR_DESK_BOT_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::Missing("REPAIR_DESK_BOT_TOKEN"))?;

        let raw_admin =
            lookup("REPAIR_DESK_SUPER_ADMIN").ok_or(ConfigError::Missing("REPAIR_DESK_SUPER_ADMIN"))?;
        let super_admin = raw_admin.parse().map_err(|_| ConfigError::Invalid {
            name: "REPAIR_DESK_SUPER_ADMIN",
            value: raw_admin.clone(),
        })?;

        let data_dir = lookup("REPAIR_DESK_DATA_DIR").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".repair-desk")
            },
            PathBuf::from,
        );

        let ttl_hours = match lookup("REPAIR_DESK_HANDOFF_TTL_HOURS") {
            Some(raw) => raw.trim().parse::<u64>().ok().filter(|h| *h > 0).ok_or(
                ConfigError::Invalid {
                    name: "REPAIR_DESK_HANDOFF_TTL_HOURS",
                    value: raw,
                },
            )?,
            None => DEFAULT_HANDOFF_TTL_HOURS,
        };

        Ok(Self {
            bot_token,
            super_admin,
            data_dir,
            catalog_path: lookup("REPAIR_DESK_CATALOG").map(PathBuf::from),
            handoff_ttl: Duration::from_secs(ttl_hours * 3600),
            api_url: lookup("REPAIR_DESK_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        })
    }

    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join("authorized_users.json")
    }

    pub fn admins_path(&self) -> PathBuf {
        self.data_dir.join("admins.json")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }
}

/// Settings changed at runtime through the admin panel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotSettings {
    /// Where submitted reports are sent for review
    #[serde(default)]
    pub review_chat_id: Option<ChatId>,
}

/// Persisted settings handle
pub type SettingsStore = JsonStore<BotSettings>;

impl SettingsStore {
    pub fn review_chat(&self) -> Option<ChatId> {
        self.read(|s| s.review_chat_id)
    }
}
