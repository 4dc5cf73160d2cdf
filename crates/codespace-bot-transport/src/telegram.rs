//! Telegram transport over the Bot API.
//!
//! [`TelegramSource`] long-polls `getUpdates` and turns messages and
//! button presses into [`InboundEvent`]s. [`TelegramSink`] renders
//! [`OutboundAction`]s back into Bot API calls.

use async_trait::async_trait;
use codespace_bot_core::{
    Button, ButtonTarget, ChatId, EventKind, InboundEvent, Keyboard, OutboundAction, Sender,
};
use teloxide::{
    prelude::*,
    types::{
        CallbackQuery, CallbackQueryId, InlineKeyboardButton, InlineKeyboardMarkup,
        MaybeInaccessibleMessage, MessageId, Recipient, ReplyParameters, Update, UpdateKind, User,
    },
};

use crate::{
    poller::{ActionSink, EventSource, TransportError},
    protocol::{self, AuditChannel, MAX_CALLBACK_BYTES},
};

/// Long-poll wait in seconds. Kept below the client's own request timeout.
const POLL_TIMEOUT_SECS: u32 = 10;

/// Build a bot client for `token`.
#[must_use]
pub fn bot(token: &str) -> Bot {
    Bot::new(token)
}

/// `getUpdates` long-poll source.
pub struct TelegramSource {
    bot: Bot,
    offset: i32,
}

impl TelegramSource {
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot, offset: 0 }
    }
}

#[async_trait]
impl EventSource for TelegramSource {
    async fn next_batch(&mut self) -> Result<Vec<InboundEvent>, TransportError> {
        let updates = self
            .bot
            .get_updates()
            .offset(self.offset)
            .timeout(POLL_TIMEOUT_SECS)
            .await
            .map_err(|e| TransportError::Poll(e.to_string()))?;

        let mut events = Vec::with_capacity(updates.len());
        for update in updates {
            let id = i32::try_from(update.id.0).unwrap_or(i32::MAX);
            self.offset = self.offset.max(id.saturating_add(1));
            if let Some(event) = to_event(update) {
                events.push(event);
            }
        }
        Ok(events)
    }
}

fn sender_of(user: &User) -> Sender {
    Sender {
        username: user.username.clone(),
        first_name: user.first_name.clone(),
    }
}

fn to_event(update: Update) -> Option<InboundEvent> {
    match update.kind {
        UpdateKind::Message(msg) => {
            let text = msg.text()?;
            let sender = msg.from.as_ref().map(sender_of).unwrap_or_default();
            let kind = protocol::parse_command(text).map_or_else(
                || EventKind::Text {
                    text: text.to_string(),
                },
                |name| EventKind::Command { name },
            );
            Some(InboundEvent {
                chat_id: ChatId(msg.chat.id.0),
                sender,
                message_id: Some(msg.id.0),
                kind,
            })
        }
        UpdateKind::CallbackQuery(query) => button_event(&query),
        _ => None,
    }
}

fn button_event(query: &CallbackQuery) -> Option<InboundEvent> {
    let message: &MaybeInaccessibleMessage = query.message.as_ref()?;
    let callback = protocol::decode_callback(query.data.as_deref().unwrap_or_default());
    Some(InboundEvent {
        chat_id: ChatId(message.chat().id.0),
        sender: sender_of(&query.from),
        message_id: Some(message.id().0),
        kind: EventKind::Button {
            callback,
            ack_id: Some(query.id.0.clone()),
        },
    })
}

fn render_button(button: &Button) -> Option<InlineKeyboardButton> {
    match &button.target {
        ButtonTarget::Callback { callback } => {
            let data = protocol::encode_callback(callback);
            if data.len() > MAX_CALLBACK_BYTES {
                tracing::warn!(label = %button.label, "Dropping button with oversized callback data");
                return None;
            }
            Some(InlineKeyboardButton::callback(button.label.clone(), data))
        }
        ButtonTarget::Url { url } => match reqwest::Url::parse(url) {
            Ok(url) => Some(InlineKeyboardButton::url(button.label.clone(), url)),
            Err(e) => {
                tracing::warn!(label = %button.label, "Dropping button with invalid URL: {e}");
                None
            }
        },
    }
}

/// Render a keyboard as an inline markup, one row per keyboard row.
#[must_use]
pub fn render_keyboard(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
        .rows
        .iter()
        .map(|row| row.iter().filter_map(render_button).collect::<Vec<_>>())
        .filter(|row| !row.is_empty())
        .collect();
    InlineKeyboardMarkup::new(rows)
}

fn recipient(channel: &AuditChannel) -> Recipient {
    match channel {
        AuditChannel::Id(id) => Recipient::Id(teloxide::types::ChatId(*id)),
        AuditChannel::Username(name) => Recipient::ChannelUsername(name.clone()),
    }
}

/// Delivers actions through the Bot API.
pub struct TelegramSink {
    bot: Bot,
    audit: Recipient,
}

impl TelegramSink {
    #[must_use]
    pub fn new(bot: Bot, audit: &AuditChannel) -> Self {
        Self {
            bot,
            audit: recipient(audit),
        }
    }
}

fn send_error(e: impl std::fmt::Display) -> TransportError {
    TransportError::Delivery(e.to_string())
}

#[async_trait]
impl ActionSink for TelegramSink {
    async fn deliver(
        &self,
        origin: &InboundEvent,
        action: OutboundAction,
    ) -> Result<(), TransportError> {
        let chat = teloxide::types::ChatId(origin.chat_id.0);

        match action {
            OutboundAction::Reply { text, keyboard } => {
                let mut request = self.bot.send_message(chat, text);
                if let Some(id) = origin.message_id {
                    request = request.reply_parameters(ReplyParameters::new(MessageId(id)));
                }
                if let Some(keyboard) = keyboard {
                    request = request.reply_markup(render_keyboard(&keyboard));
                }
                request.await.map_err(send_error)?;
            }
            OutboundAction::SendToChat { text, keyboard } => {
                let mut request = self.bot.send_message(chat, text);
                if let Some(keyboard) = keyboard {
                    request = request.reply_markup(render_keyboard(&keyboard));
                }
                request.await.map_err(send_error)?;
            }
            OutboundAction::SendToAudit { text } => {
                self.bot
                    .send_message(self.audit.clone(), text)
                    .await
                    .map_err(send_error)?;
            }
        }
        Ok(())
    }

    async fn acknowledge(&self, origin: &InboundEvent) -> Result<(), TransportError> {
        if let EventKind::Button {
            ack_id: Some(id), ..
        } = &origin.kind
        {
            self.bot
                .answer_callback_query(CallbackQueryId(id.clone()))
                .await
                .map_err(send_error)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use codespace_bot_core::{Callback, ToggleAction};

    use super::*;

    #[test]
    fn test_render_keyboard_rows() {
        let keyboard = Keyboard::column([
            Button::url("Owner", "https://t.me/owner"),
            Button::callback("Add Token", Callback::AddToken),
        ]);

        let markup = render_keyboard(&keyboard);
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[1][0].text, "Add Token");
    }

    #[test]
    fn test_render_drops_unusable_buttons() {
        let keyboard = Keyboard::column([
            Button::url("Broken", "not a url"),
            Button::callback(
                "Start",
                Callback::Toggle {
                    action: ToggleAction::Start,
                    name: "n".repeat(80),
                },
            ),
            Button::callback("Delete Token", Callback::DeleteToken),
        ]);

        let markup = render_keyboard(&keyboard);
        assert_eq!(markup.inline_keyboard.len(), 1);
        assert_eq!(markup.inline_keyboard[0][0].text, "Delete Token");
    }

    #[test]
    fn test_audit_recipient() {
        assert_eq!(
            recipient(&AuditChannel::Id(-100)),
            Recipient::Id(teloxide::types::ChatId(-100))
        );
        assert_eq!(
            recipient(&AuditChannel::Username("@audit".into())),
            Recipient::ChannelUsername("@audit".into())
        );
    }
}
