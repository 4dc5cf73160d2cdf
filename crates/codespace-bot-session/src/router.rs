//! Interaction router.
//!
//! Turns inbound chat events into store, selection and remote API calls,
//! and returns the chat actions to perform. The per-chat flow is an explicit
//! [`ChatState`]:
//!
//! ```text
//! Idle ── add_token ──> AwaitingCredential ── valid text ──> Idle
//!                               └──────── invalid text ──> AwaitingCredential
//! Idle ── your_tokens ─> Selecting ── select_token_i ──> Idle (+ toggle buttons)
//! Idle ── delete_token ─> SelectingForDelete ── confirm_delete_i ──> Idle
//! Idle ── toggle_<action>_<name> ──> Idle
//! ```
//!
//! Buttons are accepted in any state since they can come from older
//! messages. Free text is gated by [`FreeTextPolicy`].

use async_trait::async_trait;
use chrono::Utc;
use codespace_bot_core::{
    Button, Callback, ChatId, Codespace, CredentialStorage, EnvironmentApi, EventHandler,
    EventKind, InboundEvent, Keyboard, OutboundAction, Sender, ToggleAction,
};

use crate::{
    selection::{ChatState, SessionStore},
    store::{CredentialStore, TokenLoad},
};

pub const WELCOME: &str =
    "Welcome Buddy 😄! Add Your GitHub Personal Access Token By Clicking On Add Token Button ✅.";
pub const ASK_TOKEN: &str = "Please send me your GitHub Personal Access Token.";
pub const INVALID_TOKEN: &str = "Invalid token. Please check and try again.";
pub const TOKEN_ADDED: &str = "Your token has been added successfully!";
pub const NO_TOKENS: &str = "You have not added any tokens yet.";
pub const PICK_TOKEN: &str = "Select a token:";
pub const PICK_DELETE: &str = "Select the token to delete:";
pub const TOKEN_DELETED: &str = "Token deleted.";
pub const TOKEN_NOT_FOUND: &str = "That token no longer exists. Open Your Tokens and pick again.";
pub const FETCH_FAILED: &str =
    "Could not fetch codespaces for this token. It may have expired or been revoked.";
pub const NO_CODESPACES: &str = "No codespaces found for this token.";
pub const NO_SELECTION: &str = "Select a token from Your Tokens first.";
pub const CANCELLED: &str = "Cancelled.";
pub const IDLE_HINT: &str = "Use the menu below. To add a token, press Add Token first.";

/// How free-text messages are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FreeTextPolicy {
    /// Text is a credential candidate only after "Add Token" was pressed.
    #[default]
    AwaitingOnly,
    /// Every text message is validated as a credential candidate.
    AnyText,
}

/// Mask a credential for display: keep four characters on each end.
#[must_use]
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 10 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}

/// Interaction router over a storage backend and a remote API.
pub struct Router<S, A>
where
    S: CredentialStorage,
    A: EnvironmentApi,
{
    store: CredentialStore<S>,
    api: A,
    sessions: SessionStore,
    free_text: FreeTextPolicy,
    owner_url: Option<String>,
}

impl<S, A> Router<S, A>
where
    S: CredentialStorage,
    A: EnvironmentApi,
{
    /// Create a router with default policy and no selection expiry.
    #[must_use]
    pub fn new(storage: S, api: A) -> Self {
        Self {
            store: CredentialStore::new(storage),
            api,
            sessions: SessionStore::new(),
            free_text: FreeTextPolicy::default(),
            owner_url: None,
        }
    }

    /// Replace the session store (e.g. one with a TTL).
    #[must_use]
    pub fn with_sessions(mut self, sessions: SessionStore) -> Self {
        self.sessions = sessions;
        self
    }

    #[must_use]
    pub const fn with_free_text_policy(mut self, policy: FreeTextPolicy) -> Self {
        self.free_text = policy;
        self
    }

    /// Add a URL button on top of the main menu.
    #[must_use]
    pub fn with_owner_url(mut self, url: Option<String>) -> Self {
        self.owner_url = url;
        self
    }

    #[must_use]
    pub const fn store(&self) -> &CredentialStore<S> {
        &self.store
    }

    #[must_use]
    pub const fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Main menu keyboard.
    #[must_use]
    pub fn main_menu(&self) -> Keyboard {
        let mut buttons = Vec::with_capacity(4);
        if let Some(url) = &self.owner_url {
            buttons.push(Button::url("🗿Owner🗿", url.clone()));
        }
        buttons.push(Button::callback("Add Token", Callback::AddToken));
        buttons.push(Button::callback("Your Tokens", Callback::YourTokens));
        buttons.push(Button::callback("Delete Token", Callback::DeleteToken));
        Keyboard::column(buttons)
    }

    /// Dispatch one event.
    pub async fn handle_event(&self, event: InboundEvent) -> Vec<OutboundAction> {
        let chat_id = event.chat_id;
        match event.kind {
            EventKind::Command { name } => match name.as_str() {
                "start" | "menu" | "help" => {
                    self.sessions.set_state(chat_id, ChatState::Idle);
                    vec![OutboundAction::reply_with(WELCOME, self.main_menu())]
                }
                "cancel" => {
                    self.sessions.set_state(chat_id, ChatState::Idle);
                    vec![OutboundAction::reply_with(CANCELLED, self.main_menu())]
                }
                // Never a credential candidate, whatever the state.
                _ => {
                    tracing::debug!(%chat_id, command = %name, "Unknown command");
                    vec![OutboundAction::reply_with(IDLE_HINT, self.main_menu())]
                }
            },
            EventKind::Text { text } => self.on_text(chat_id, &event.sender, &text).await,
            EventKind::Button { callback, .. } => self.on_button(chat_id, callback).await,
        }
    }

    async fn on_text(&self, chat_id: ChatId, sender: &Sender, text: &str) -> Vec<OutboundAction> {
        let accepted = match self.free_text {
            FreeTextPolicy::AnyText => true,
            FreeTextPolicy::AwaitingOnly => {
                self.sessions.state(chat_id) == ChatState::AwaitingCredential
            }
        };

        if !accepted {
            tracing::debug!(%chat_id, "Ignoring free text outside of the add-token flow");
            return vec![OutboundAction::reply_with(IDLE_HINT, self.main_menu())];
        }

        self.submit_credential(chat_id, sender, text.trim()).await
    }

    async fn submit_credential(
        &self,
        chat_id: ChatId,
        sender: &Sender,
        candidate: &str,
    ) -> Vec<OutboundAction> {
        if candidate.is_empty() {
            return vec![OutboundAction::reply(INVALID_TOKEN)];
        }

        // Validation and first use are the same upstream call.
        let Some(codespaces) = self.api.list_environments(candidate).await else {
            tracing::info!(%chat_id, "Token rejected by upstream");
            return vec![OutboundAction::reply(INVALID_TOKEN)];
        };

        self.store.save(chat_id, candidate).await;
        self.sessions.select_credential(chat_id, candidate);
        self.sessions.set_state(chat_id, ChatState::Idle);

        vec![
            OutboundAction::SendToAudit {
                text: format!(
                    "New token added:\nUser: @{}\nTime: {}",
                    sender.display_name(),
                    Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
                ),
            },
            OutboundAction::reply(TOKEN_ADDED),
            Self::codespace_listing(&codespaces),
        ]
    }

    async fn on_button(&self, chat_id: ChatId, callback: Callback) -> Vec<OutboundAction> {
        match callback {
            Callback::AddToken => {
                self.sessions.set_state(chat_id, ChatState::AwaitingCredential);
                vec![OutboundAction::send(ASK_TOKEN)]
            }
            Callback::YourTokens => {
                self.token_picker(chat_id, ChatState::Selecting, PICK_TOKEN, |index| {
                    Callback::SelectToken { index }
                })
                .await
            }
            Callback::DeleteToken => {
                self.token_picker(chat_id, ChatState::SelectingForDelete, PICK_DELETE, |index| {
                    Callback::ConfirmDelete { index }
                })
                .await
            }
            Callback::SelectToken { index } => self.select_token(chat_id, index).await,
            Callback::ConfirmDelete { index } => self.confirm_delete(chat_id, index).await,
            Callback::Toggle { action, name } => self.toggle(chat_id, action, &name).await,
            Callback::Unknown { data } => {
                tracing::debug!(%chat_id, data = %data, "Unknown callback");
                Vec::new()
            }
        }
    }

    async fn token_picker(
        &self,
        chat_id: ChatId,
        next: ChatState,
        prompt: &str,
        to_callback: impl Fn(usize) -> Callback,
    ) -> Vec<OutboundAction> {
        let record = self.store.load_record(chat_id).await;
        if record.is_empty() {
            self.sessions.set_state(chat_id, ChatState::Idle);
            return vec![OutboundAction::send_with(NO_TOKENS, self.main_menu())];
        }

        let buttons = record.entries().enumerate().map(|(i, (token, added))| {
            Button::callback(
                format!("{}. {} (added {})", i + 1, mask_token(token), added.format("%Y-%m-%d")),
                to_callback(i),
            )
        });
        let keyboard = Keyboard::column(buttons);

        self.sessions.set_state(chat_id, next);
        vec![OutboundAction::send_with(prompt, keyboard)]
    }

    async fn select_token(&self, chat_id: ChatId, index: usize) -> Vec<OutboundAction> {
        self.sessions.set_state(chat_id, ChatState::Idle);

        let tokens = self.store.load(chat_id).await;
        let Some(token) = tokens.get(index) else {
            return vec![OutboundAction::send_with(TOKEN_NOT_FOUND, self.main_menu())];
        };

        self.sessions.select_credential(chat_id, token);

        match self.api.list_environments(token).await {
            Some(codespaces) => vec![Self::codespace_listing(&codespaces)],
            None => vec![OutboundAction::send(FETCH_FAILED)],
        }
    }

    async fn confirm_delete(&self, chat_id: ChatId, index: usize) -> Vec<OutboundAction> {
        self.sessions.set_state(chat_id, ChatState::Idle);

        if index >= self.store.load(chat_id).await.len() {
            return vec![OutboundAction::send_with(TOKEN_NOT_FOUND, self.main_menu())];
        }

        self.store.delete(chat_id, index).await;
        vec![OutboundAction::send_with(TOKEN_DELETED, self.main_menu())]
    }

    async fn toggle(&self, chat_id: ChatId, action: ToggleAction, name: &str) -> Vec<OutboundAction> {
        self.sessions.set_state(chat_id, ChatState::Idle);
        self.sessions.select(chat_id, name);

        let Some(credential) = self.sessions.selected_credential(chat_id) else {
            return vec![OutboundAction::send_with(NO_SELECTION, self.main_menu())];
        };

        // An unreachable store must not block the toggle.
        if matches!(
            self.store.load_checked(chat_id).await,
            TokenLoad::Loaded(tokens) if !tokens.contains(&credential)
        ) {
            return vec![OutboundAction::send_with(TOKEN_NOT_FOUND, self.main_menu())];
        }

        let text = if self.api.toggle_environment(&credential, name, action).await {
            match action {
                ToggleAction::Start => format!("✅ Codespace {name} is starting."),
                ToggleAction::Stop => format!("✅ Codespace {name} is stopping."),
            }
        } else {
            format!("❌ Failed to {action} codespace {name}. Please try again.")
        };

        vec![OutboundAction::send(text)]
    }

    fn codespace_listing(codespaces: &[Codespace]) -> OutboundAction {
        if codespaces.is_empty() {
            return OutboundAction::send(NO_CODESPACES);
        }

        let mut text = String::from("Your codespaces:");
        for cs in codespaces {
            text.push_str("\n• ");
            text.push_str(cs.label());
            text.push_str(" [");
            text.push_str(&cs.state);
            text.push(']');
            if let Some(repo) = &cs.repository {
                text.push_str(" · ");
                text.push_str(&repo.full_name);
            }
        }

        let buttons = codespaces.iter().map(|cs| {
            let action = cs.next_action();
            let label = match action {
                ToggleAction::Start => format!("▶️ Start {}", cs.label()),
                ToggleAction::Stop => format!("⏹ Stop {}", cs.label()),
            };
            Button::callback(
                label,
                Callback::Toggle {
                    action,
                    name: cs.name.clone(),
                },
            )
        });

        OutboundAction::send_with(text, Keyboard::column(buttons))
    }
}

#[async_trait]
impl<S, A> EventHandler for Router<S, A>
where
    S: CredentialStorage,
    A: EnvironmentApi,
{
    async fn handle(&self, event: InboundEvent) -> Vec<OutboundAction> {
        self.handle_event(event).await
    }
}
