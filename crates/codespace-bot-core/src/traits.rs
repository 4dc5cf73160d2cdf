//! Core traits for storage, the remote API and event handling.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    event::{InboundEvent, OutboundAction},
    types::{ChatId, Codespace, CredentialRecord, ToggleAction},
};

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Corrupt record for chat {chat_id}: {reason}")]
    Corrupt { chat_id: ChatId, reason: String },
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Trait for credential storage backends.
///
/// Each method is one atomic step against the backend. The two-phase delete
/// (`unset` then `compact`) is sequenced by the caller.
#[async_trait]
pub trait CredentialStorage: Send + Sync {
    /// Fetch the record for a chat. Unset slots are never returned.
    async fn find(&self, chat_id: ChatId) -> Result<Option<CredentialRecord>, StorageError>;

    /// Append a credential and its timestamp, creating the record if absent.
    ///
    /// Both sequences must grow in the same atomic operation.
    async fn push(
        &self,
        chat_id: ChatId,
        token: &str,
        created_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Unset the `index`-th live slot in both sequences.
    ///
    /// `index` is the position in the record returned by `find`, so slots
    /// left unset by an earlier failed compaction are skipped.
    ///
    /// Returns `false` when nothing changed (no record, index out of range,
    /// slot already unset).
    async fn unset(&self, chat_id: ChatId, index: usize) -> Result<bool, StorageError>;

    /// Remove every unset slot from both sequences in one update.
    async fn compact(&self, chat_id: ChatId) -> Result<(), StorageError>;
}

#[async_trait]
impl<T: CredentialStorage + ?Sized> CredentialStorage for Arc<T> {
    async fn find(&self, chat_id: ChatId) -> Result<Option<CredentialRecord>, StorageError> {
        (**self).find(chat_id).await
    }

    async fn push(
        &self,
        chat_id: ChatId,
        token: &str,
        created_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        (**self).push(chat_id, token, created_at).await
    }

    async fn unset(&self, chat_id: ChatId, index: usize) -> Result<bool, StorageError> {
        (**self).unset(chat_id, index).await
    }

    async fn compact(&self, chat_id: ChatId) -> Result<(), StorageError> {
        (**self).compact(chat_id).await
    }
}

/// Trait for the remote environment API.
///
/// Failures never surface as errors: a failed list is `None`, a failed
/// toggle is `false`.
#[async_trait]
pub trait EnvironmentApi: Send + Sync {
    /// List the codespaces visible to `credential`.
    ///
    /// `None` means the call failed; `Some(vec![])` means the account has no
    /// codespaces. A credential is valid iff this returns `Some`.
    async fn list_environments(&self, credential: &str) -> Option<Vec<Codespace>>;

    /// Start or stop a codespace. Single attempt, no retry.
    async fn toggle_environment(&self, credential: &str, name: &str, action: ToggleAction)
    -> bool;
}

#[async_trait]
impl<T: EnvironmentApi + ?Sized> EnvironmentApi for Arc<T> {
    async fn list_environments(&self, credential: &str) -> Option<Vec<Codespace>> {
        (**self).list_environments(credential).await
    }

    async fn toggle_environment(
        &self,
        credential: &str,
        name: &str,
        action: ToggleAction,
    ) -> bool {
        (**self).toggle_environment(credential, name, action).await
    }
}

/// Trait for anything that turns inbound events into outbound actions.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one event. Never fails: problems become user-facing replies.
    async fn handle(&self, event: InboundEvent) -> Vec<OutboundAction>;
}

#[async_trait]
impl<T: EventHandler + ?Sized> EventHandler for Arc<T> {
    async fn handle(&self, event: InboundEvent) -> Vec<OutboundAction> {
        (**self).handle(event).await
    }
}
