//! Domain types shared by every crate.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chat identifier, the key of every per-user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChatId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Stored credentials of one chat.
///
/// `tokens` and `timestamps` are positionally aligned: the credential at
/// index `i` was added at `timestamps[i]`. Insertion order is the display
/// order used by positional deletes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub chat_id: ChatId,
    pub tokens: Vec<String>,
    pub timestamps: Vec<DateTime<Utc>>,
}

impl CredentialRecord {
    /// Create an empty record.
    #[must_use]
    pub const fn empty(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            tokens: Vec::new(),
            timestamps: Vec::new(),
        }
    }

    /// Number of stored credentials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Whether both sequences have the same length.
    #[must_use]
    pub fn is_aligned(&self) -> bool {
        self.tokens.len() == self.timestamps.len()
    }

    /// Iterate `(token, added_at)` pairs in display order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &DateTime<Utc>)> {
        self.tokens
            .iter()
            .map(String::as_str)
            .zip(self.timestamps.iter())
    }

    #[must_use]
    pub fn into_tokens(self) -> Vec<String> {
        self.tokens
    }
}

/// Requested power action for a codespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleAction {
    Start,
    Stop,
}

impl ToggleAction {
    /// Path segment used by the remote API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for ToggleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown action.
#[derive(Debug, thiserror::Error)]
#[error("Unknown toggle action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for ToggleAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

/// Repository a codespace was created from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub full_name: String,
}

/// Remote environment descriptor, as returned by the list endpoint.
///
/// Only the fields the bot renders are kept; everything else in the
/// upstream payload is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Codespace {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub repository: Option<Repository>,
}

impl Codespace {
    /// Create a descriptor with a name and state.
    #[must_use]
    pub fn new(name: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            state: state.into(),
            repository: None,
        }
    }

    /// Human-facing label.
    #[must_use]
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    /// Whether the codespace is running or on its way up.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(
            self.state.as_str(),
            "Available" | "Starting" | "Rebuilding" | "Updating" | "Provisioning" | "Queued"
        )
    }

    /// Action offered to the user for this codespace.
    #[must_use]
    pub fn next_action(&self) -> ToggleAction {
        if self.is_running() {
            ToggleAction::Stop
        } else {
            ToggleAction::Start
        }
    }
}
