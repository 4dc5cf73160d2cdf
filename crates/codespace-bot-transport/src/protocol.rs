//! Wire protocol for button payloads and commands.
//!
//! Callback payloads are short ASCII strings:
//! `add_token`, `your_tokens`, `select_token_<i>`, `delete_token`,
//! `confirm_delete_<i>`, `toggle_<start|stop>_<name>`.

use std::{fmt, str::FromStr};

use codespace_bot_core::{Callback, ToggleAction};

/// Telegram's limit on callback payload size.
pub const MAX_CALLBACK_BYTES: usize = 64;

/// Encode a callback payload.
#[must_use]
pub fn encode_callback(callback: &Callback) -> String {
    match callback {
        Callback::AddToken => "add_token".to_string(),
        Callback::YourTokens => "your_tokens".to_string(),
        Callback::SelectToken { index } => format!("select_token_{index}"),
        Callback::DeleteToken => "delete_token".to_string(),
        Callback::ConfirmDelete { index } => format!("confirm_delete_{index}"),
        Callback::Toggle { action, name } => format!("toggle_{action}_{name}"),
        Callback::Unknown { data } => data.clone(),
    }
}

/// Decode a callback payload. Anything unrecognised becomes
/// [`Callback::Unknown`].
#[must_use]
pub fn decode_callback(data: &str) -> Callback {
    let parsed = match data {
        "add_token" => Some(Callback::AddToken),
        "your_tokens" => Some(Callback::YourTokens),
        "delete_token" => Some(Callback::DeleteToken),
        _ => decode_parameterised(data),
    };

    parsed.unwrap_or_else(|| Callback::Unknown {
        data: data.to_string(),
    })
}

fn decode_parameterised(data: &str) -> Option<Callback> {
    if let Some(index) = data.strip_prefix("select_token_") {
        return index.parse().ok().map(|index| Callback::SelectToken { index });
    }
    if let Some(index) = data.strip_prefix("confirm_delete_") {
        return index.parse().ok().map(|index| Callback::ConfirmDelete { index });
    }
    if let Some(rest) = data.strip_prefix("toggle_") {
        let (action, name) = rest.split_once('_')?;
        if name.is_empty() {
            return None;
        }
        let action = action.parse::<ToggleAction>().ok()?;
        return Some(Callback::Toggle {
            action,
            name: name.to_string(),
        });
    }
    None
}

/// Whether a callback fits the platform payload limit.
#[must_use]
pub fn fits_callback_limit(callback: &Callback) -> bool {
    encode_callback(callback).len() <= MAX_CALLBACK_BYTES
}

/// Extract the command name from a `/command@bot args` message.
#[must_use]
pub fn parse_command(text: &str) -> Option<String> {
    let word = text.trim_start().strip_prefix('/')?.split_whitespace().next()?;
    let name = word.split_once('@').map_or(word, |(name, _bot)| name);
    if name.is_empty() {
        None
    } else {
        Some(name.to_ascii_lowercase())
    }
}

/// Destination of audit lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditChannel {
    /// Numeric chat id, e.g. `-1001234567890`.
    Id(i64),
    /// Public channel username, e.g. `@my_audit`.
    Username(String),
}

/// Error returned for an unusable audit channel.
#[derive(Debug, thiserror::Error)]
#[error("Invalid audit channel: {0:?} (expected a numeric id or @username)")]
pub struct InvalidAuditChannel(pub String);

impl FromStr for AuditChannel {
    type Err = InvalidAuditChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(name) = s.strip_prefix('@') {
            if name.is_empty() {
                return Err(InvalidAuditChannel(s.to_string()));
            }
            return Ok(Self::Username(s.to_string()));
        }
        s.parse()
            .map(Self::Id)
            .map_err(|_| InvalidAuditChannel(s.to_string()))
    }
}

impl fmt::Display for AuditChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Username(name) => f.write_str(name),
        }
    }
}
