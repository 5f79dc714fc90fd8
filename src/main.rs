//! Repair Desk - Telegram bot for bike repair reports
//!
//! Mechanics assemble a repair report through a button-driven dialogue; the
//! report is handed off to a review chat where a dispatcher accepts or
//! declines it, and the mechanic is told the outcome.

mod access;
mod catalog;
mod channel;
mod config;
mod dispatch;
mod handoff;
mod identity;
mod render;
mod runtime;
mod state_machine;
mod store;

use access::AccessControl;
use catalog::Catalog;
use channel::TelegramChannel;
use config::{BotConfig, SettingsStore};
use handoff::HandoffRegistry;
use runtime::{Engine, RuntimeManager, SWEEP_INTERVAL};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repair_desk=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = BotConfig::from_env()?;
    tracing::info!(
        data_dir = %config.data_dir.display(),
        super_admin = %config.super_admin,
        handoff_ttl = ?config.handoff_ttl,
        "Configuration loaded"
    );

    let access = AccessControl::open(config.super_admin, config.users_path(), config.admins_path())?;
    let settings = SettingsStore::open(config.settings_path())?;
    match settings.review_chat() {
        Some(chat) => tracing::info!(review_chat = %chat, "Review chat configured"),
        None => tracing::warn!("No review chat configured. Set one with /admin."),
    }

    let catalog = match &config.catalog_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading catalog");
            Catalog::load(path)?
        }
        None => Catalog::default(),
    };
    tracing::info!(
        categories = catalog.categories().len(),
        items = catalog.item_names().len(),
        "Catalog ready"
    );

    let channel = Arc::new(TelegramChannel::new(&config.api_url, &config.bot_token)?);
    let engine = Engine::new(
        Arc::clone(&channel),
        Arc::new(catalog),
        access,
        settings,
        Arc::new(HandoffRegistry::new(config.handoff_ttl)),
    );
    let manager = RuntimeManager::new(Arc::new(engine));

    // Shutdown on Ctrl-C
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                return;
            }
            tracing::info!("Shutdown requested");
            shutdown.cancel();
        }
    });

    let sweeper = manager.start_sweeper(SWEEP_INTERVAL, shutdown.clone());
    manager.run_polling(channel.as_ref(), shutdown).await;
    sweeper.await?;

    Ok(())
}
