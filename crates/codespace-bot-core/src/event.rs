//! Transport-neutral event model.
//!
//! The transport turns platform updates into [`InboundEvent`]s and renders
//! the [`OutboundAction`]s a handler returns. Neither side knows the other's
//! concrete types.

use serde::{Deserialize, Serialize};

use crate::types::{ChatId, ToggleAction};

/// Who sent an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub username: Option<String>,
    pub first_name: String,
}

impl Sender {
    /// Name used in audit lines: the username when set, else the first name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.first_name)
    }
}

/// Button press payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Callback {
    /// Open the "add credential" flow.
    AddToken,
    /// List stored credentials.
    YourTokens,
    /// Pick the credential at a display index.
    SelectToken { index: usize },
    /// Open the delete picker.
    DeleteToken,
    /// Delete the credential at a display index.
    ConfirmDelete { index: usize },
    /// Start or stop a codespace with the selected credential.
    Toggle { action: ToggleAction, name: String },
    /// Payload the transport could not decode.
    Unknown { data: String },
}

/// Kind of inbound event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// Slash command, without the leading slash (e.g. `start`).
    Command { name: String },
    /// Free text.
    Text { text: String },
    /// Button press. `ack_id` lets the transport acknowledge the press.
    Button {
        callback: Callback,
        ack_id: Option<String>,
    },
}

/// Inbound chat event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub chat_id: ChatId,
    pub sender: Sender,
    /// Message the event came from, used for replies.
    pub message_id: Option<i32>,
    pub kind: EventKind,
}

impl InboundEvent {
    #[must_use]
    pub fn command(chat_id: ChatId, sender: Sender, name: impl Into<String>) -> Self {
        Self {
            chat_id,
            sender,
            message_id: None,
            kind: EventKind::Command { name: name.into() },
        }
    }

    #[must_use]
    pub fn text(chat_id: ChatId, sender: Sender, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            sender,
            message_id: None,
            kind: EventKind::Text { text: text.into() },
        }
    }

    #[must_use]
    pub const fn button(chat_id: ChatId, sender: Sender, callback: Callback) -> Self {
        Self {
            chat_id,
            sender,
            message_id: None,
            kind: EventKind::Button {
                callback,
                ack_id: None,
            },
        }
    }

    /// Attach the originating message id.
    #[must_use]
    pub const fn with_message_id(mut self, message_id: i32) -> Self {
        self.message_id = Some(message_id);
        self
    }
}

/// What a button does when pressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ButtonTarget {
    Callback { callback: Callback },
    Url { url: String },
}

/// Inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub target: ButtonTarget,
}

impl Button {
    #[must_use]
    pub fn callback(label: impl Into<String>, callback: Callback) -> Self {
        Self {
            label: label.into(),
            target: ButtonTarget::Callback { callback },
        }
    }

    #[must_use]
    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            target: ButtonTarget::Url { url: url.into() },
        }
    }
}

/// Inline keyboard, one `Vec` per row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    /// Keyboard with one button per row.
    #[must_use]
    pub fn column(buttons: impl IntoIterator<Item = Button>) -> Self {
        Self {
            rows: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }

    /// Iterate all buttons, row by row.
    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }

    /// Callback payloads carried by this keyboard.
    pub fn callbacks(&self) -> impl Iterator<Item = &Callback> {
        self.buttons().filter_map(|b| match &b.target {
            ButtonTarget::Callback { callback } => Some(callback),
            ButtonTarget::Url { .. } => None,
        })
    }
}

/// Outbound action produced by a handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundAction {
    /// Reply to the message that triggered the event.
    Reply {
        text: String,
        keyboard: Option<Keyboard>,
    },
    /// Plain message to the event's chat.
    SendToChat {
        text: String,
        keyboard: Option<Keyboard>,
    },
    /// Line for the audit channel.
    SendToAudit { text: String },
}

impl OutboundAction {
    #[must_use]
    pub fn reply(text: impl Into<String>) -> Self {
        Self::Reply {
            text: text.into(),
            keyboard: None,
        }
    }

    #[must_use]
    pub fn send(text: impl Into<String>) -> Self {
        Self::SendToChat {
            text: text.into(),
            keyboard: None,
        }
    }

    #[must_use]
    pub fn send_with(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self::SendToChat {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }

    #[must_use]
    pub fn reply_with(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self::Reply {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }

    /// Message text.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Reply { text, .. } | Self::SendToChat { text, .. } | Self::SendToAudit { text } => {
                text
            }
        }
    }

    /// Attached keyboard, if any.
    #[must_use]
    pub const fn keyboard(&self) -> Option<&Keyboard> {
        match self {
            Self::Reply { keyboard, .. } | Self::SendToChat { keyboard, .. } => keyboard.as_ref(),
            Self::SendToAudit { .. } => None,
        }
    }
}
