//! Process configuration read from environment variables.

use std::time::Duration;

use codespace_bot_session::FreeTextPolicy;
use codespace_bot_transport::AuditChannel;
use thiserror::Error;

const DEFAULT_DATABASE_URL: &str = "sqlite://codespace-bot.db?mode=rwc";
const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
const DEFAULT_GITHUB_TIMEOUT_SECS: u64 = 10;
const DEFAULT_POLL_BACKOFF_SECS: u64 = 15;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{key} has an invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub audit_channel: AuditChannel,
    pub database_url: String,
    pub github_api_url: String,
    pub github_timeout: Duration,
    pub poll_backoff: Duration,
    /// Expiry of per-chat selections. `None` keeps them for the process
    /// lifetime.
    pub selection_ttl: Option<Duration>,
    pub free_text_policy: FreeTextPolicy,
    pub owner_url: Option<String>,
}

impl Config {
    /// Read from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read through `lookup`. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bot_token = get("TELEGRAM_BOT_TOKEN").ok_or(ConfigError::Missing("TELEGRAM_BOT_TOKEN"))?;

        let channel = get("CHANNEL_ID").ok_or(ConfigError::Missing("CHANNEL_ID"))?;
        let audit_channel = channel
            .parse::<AuditChannel>()
            .map_err(|e| ConfigError::Invalid {
                key: "CHANNEL_ID",
                value: channel.clone(),
                reason: e.to_string(),
            })?;

        let seconds = |key: &'static str| -> Result<Option<Duration>, ConfigError> {
            get(key)
                .map(|value| {
                    value
                        .parse::<u64>()
                        .map(Duration::from_secs)
                        .map_err(|e| ConfigError::Invalid {
                            key,
                            value: value.clone(),
                            reason: e.to_string(),
                        })
                })
                .transpose()
        };

        let nonzero_seconds = |key: &'static str| -> Result<Option<Duration>, ConfigError> {
            match seconds(key)? {
                Some(duration) if duration.is_zero() => Err(ConfigError::Invalid {
                    key,
                    value: "0".to_string(),
                    reason: "must be at least 1 second".to_string(),
                }),
                other => Ok(other),
            }
        };

        let free_text_policy = match get("FREE_TEXT_POLICY").as_deref() {
            None | Some("awaiting") => FreeTextPolicy::AwaitingOnly,
            Some("any") => FreeTextPolicy::AnyText,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "FREE_TEXT_POLICY",
                    value: other.to_string(),
                    reason: "expected \"awaiting\" or \"any\"".to_string(),
                });
            }
        };

        Ok(Self {
            bot_token,
            audit_channel,
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            github_api_url: get("GITHUB_API_URL")
                .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string()),
            github_timeout: nonzero_seconds("GITHUB_TIMEOUT_SECS")?
                .unwrap_or(Duration::from_secs(DEFAULT_GITHUB_TIMEOUT_SECS)),
            poll_backoff: seconds("POLL_BACKOFF_SECS")?
                .unwrap_or(Duration::from_secs(DEFAULT_POLL_BACKOFF_SECS)),
            selection_ttl: nonzero_seconds("SELECTION_TTL_SECS")?,
            free_text_policy,
            owner_url: get("OWNER_URL"),
        })
    }
}
