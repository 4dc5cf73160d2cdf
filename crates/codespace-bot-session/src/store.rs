//! Best-effort credential store.
//!
//! Wraps a [`CredentialStorage`] backend and applies the "degrade to empty"
//! policy: storage failures are logged and turned into empty results or
//! no-ops, never returned to the caller. Callers that need to tell "no data"
//! from "store unreachable" use [`CredentialStore::load_checked`].

use chrono::Utc;
use codespace_bot_core::{ChatId, CredentialRecord, CredentialStorage};

/// Outcome of a checked load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenLoad {
    /// The store answered; the sequence may be empty.
    Loaded(Vec<String>),
    /// The store could not be read.
    Unavailable,
}

impl TokenLoad {
    /// Lenient view: an unavailable store reads as "no tokens".
    #[must_use]
    pub fn into_tokens(self) -> Vec<String> {
        match self {
            Self::Loaded(tokens) => tokens,
            Self::Unavailable => Vec::new(),
        }
    }

    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

/// Credential store facade over a storage backend.
#[derive(Debug)]
pub struct CredentialStore<S> {
    storage: S,
}

impl<S: CredentialStorage> CredentialStore<S> {
    /// Create a new store over `storage`.
    #[must_use]
    pub const fn new(storage: S) -> Self {
        Self { storage }
    }

    /// The wrapped backend.
    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Load a chat's credentials in display order.
    pub async fn load_checked(&self, chat_id: ChatId) -> TokenLoad {
        match self.storage.find(chat_id).await {
            Ok(record) => TokenLoad::Loaded(record.map(CredentialRecord::into_tokens).unwrap_or_default()),
            Err(e) => {
                tracing::warn!(%chat_id, "Failed to load tokens: {e}");
                TokenLoad::Unavailable
            }
        }
    }

    /// Load a chat's credentials; empty when absent or on failure.
    pub async fn load(&self, chat_id: ChatId) -> Vec<String> {
        self.load_checked(chat_id).await.into_tokens()
    }

    /// Load the full record including timestamps; empty when absent or on
    /// failure.
    pub async fn load_record(&self, chat_id: ChatId) -> CredentialRecord {
        match self.storage.find(chat_id).await {
            Ok(record) => record.unwrap_or_else(|| CredentialRecord::empty(chat_id)),
            Err(e) => {
                tracing::warn!(%chat_id, "Failed to load token record: {e}");
                CredentialRecord::empty(chat_id)
            }
        }
    }

    /// Append a credential stamped with the current time. Upsert.
    pub async fn save(&self, chat_id: ChatId, credential: &str) {
        match self.storage.push(chat_id, credential, Utc::now()).await {
            Ok(()) => tracing::info!(%chat_id, "Token saved"),
            Err(e) => tracing::error!(%chat_id, "Failed to save token: {e}"),
        }
    }

    /// Remove the credential at `index` (display order) and compact.
    ///
    /// Compaction runs only if the unset step changed something, so an
    /// out-of-range index is a pure no-op. The index comes from an earlier
    /// listing; a concurrent add from elsewhere can shift it.
    pub async fn delete(&self, chat_id: ChatId, index: usize) {
        match self.storage.unset(chat_id, index).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(%chat_id, index, "Delete matched no token");
                return;
            }
            Err(e) => {
                tracing::error!(%chat_id, index, "Failed to delete token: {e}");
                return;
            }
        }

        match self.storage.compact(chat_id).await {
            Ok(()) => tracing::info!(%chat_id, index, "Token deleted"),
            Err(e) => tracing::error!(%chat_id, index, "Failed to compact tokens: {e}"),
        }
    }
}
