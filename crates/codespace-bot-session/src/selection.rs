//! Per-chat interaction state and selection.
//!
//! Lives in process memory only and is lost on restart. Entries never expire
//! unless a TTL is configured; a successful toggle does not clear anything.

use std::time::{Duration, Instant};

use codespace_bot_core::ChatId;
use dashmap::DashMap;

/// Where a chat is in the interaction flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChatState {
    #[default]
    Idle,
    AwaitingCredential,
    Selecting,
    SelectingForDelete,
}

#[derive(Debug, Default)]
struct ChatSession {
    state: ChatState,
    credential: Option<String>,
    environment: Option<String>,
    touched: Option<Instant>,
}

/// Keyed store of per-chat sessions.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<ChatId, ChatSession>,
    ttl: Option<Duration>,
}

impl SessionStore {
    /// Store without expiry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose selections expire `ttl` after the last write.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl: Some(ttl),
        }
    }

    fn is_expired(&self, session: &ChatSession) -> bool {
        match (self.ttl, session.touched) {
            (Some(ttl), Some(touched)) => touched.elapsed() >= ttl,
            _ => false,
        }
    }

    fn update(&self, chat_id: ChatId, f: impl FnOnce(&mut ChatSession)) {
        let mut session = self.sessions.entry(chat_id).or_default();
        if self.is_expired(&session) {
            *session = ChatSession::default();
        }
        f(&mut session);
        session.touched = Some(Instant::now());
    }

    /// Record the environment chosen for `chat_id`, replacing any earlier one.
    pub fn select(&self, chat_id: ChatId, environment_name: &str) {
        self.update(chat_id, |s| s.environment = Some(environment_name.to_string()));
    }

    /// Last environment chosen for `chat_id`.
    #[must_use]
    pub fn current(&self, chat_id: ChatId) -> Option<String> {
        self.sessions
            .get(&chat_id)
            .filter(|s| !self.is_expired(s))
            .and_then(|s| s.environment.clone())
    }

    /// Record the credential picked from the token list.
    pub fn select_credential(&self, chat_id: ChatId, credential: &str) {
        self.update(chat_id, |s| s.credential = Some(credential.to_string()));
    }

    /// Credential picked from the token list.
    #[must_use]
    pub fn selected_credential(&self, chat_id: ChatId) -> Option<String> {
        self.sessions
            .get(&chat_id)
            .filter(|s| !self.is_expired(s))
            .and_then(|s| s.credential.clone())
    }

    /// Current interaction state; `Idle` when unknown or expired.
    #[must_use]
    pub fn state(&self, chat_id: ChatId) -> ChatState {
        self.sessions
            .get(&chat_id)
            .filter(|s| !self.is_expired(s))
            .map_or(ChatState::Idle, |s| s.state)
    }

    pub fn set_state(&self, chat_id: ChatId, state: ChatState) {
        self.update(chat_id, |s| s.state = state);
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        if self.ttl.is_none() {
            return 0;
        }
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !self.is_expired(s));
        before - self.sessions.len()
    }

    /// Number of tracked chats.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
