//! Telegram bot for managing GitHub Codespaces.
//!
//! Run with: cargo run -p codespace-bot
//!
//! Reads `TELEGRAM_BOT_TOKEN` and `CHANNEL_ID` (plus optional settings, see
//! `config.rs`) from the environment or a `.env` file.

mod config;

use std::sync::Arc;

use anyhow::Context as _;
use codespace_bot_github::GithubClient;
use codespace_bot_session::{Router, SessionStore, storage::SqliteStorage};
use codespace_bot_transport::{
    Poller,
    telegram::{self, TelegramSink, TelegramSource},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::from_env().context("Invalid configuration")?;

    let storage = SqliteStorage::connect(&config.database_url)
        .await
        .context("Failed to open token store")?;

    let github = GithubClient::builder()
        .base_url(config.github_api_url.clone())
        .timeout(config.github_timeout)
        .build()
        .context("Failed to build GitHub client")?;

    let sessions = config
        .selection_ttl
        .map_or_else(SessionStore::new, SessionStore::with_ttl);

    let router = Arc::new(
        Router::new(storage, github)
            .with_sessions(sessions)
            .with_free_text_policy(config.free_text_policy)
            .with_owner_url(config.owner_url.clone()),
    );

    if let Some(ttl) = config.selection_ttl {
        let router = Arc::clone(&router);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(ttl);
            loop {
                interval.tick().await;
                let purged = router.sessions().purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "Expired selections removed");
                }
            }
        });
    }

    let bot = telegram::bot(&config.bot_token);
    let source = TelegramSource::new(bot.clone());
    let sink = TelegramSink::new(bot, &config.audit_channel);

    tracing::info!(audit = %config.audit_channel, "Bot is running");

    Poller::new(config.poll_backoff)
        .run_until(source, &sink, &router, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await;

    router.store().storage().close().await;
    Ok(())
}
