//! In-memory credential storage.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use codespace_bot_core::{ChatId, CredentialRecord, CredentialStorage, StorageError};

/// Record layout with unsettable slots, mirroring a document store.
#[derive(Debug, Default)]
struct StoredRecord {
    tokens: Vec<Option<String>>,
    timestamps: Vec<Option<DateTime<Utc>>>,
}

/// In-memory storage implementation.
///
/// Useful for development and tests.
/// Data is lost on restart.
#[derive(Debug)]
pub struct MemoryStorage {
    records: RwLock<HashMap<ChatId, StoredRecord>>,
}

impl MemoryStorage {
    /// Create a new in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Number of slots still physically present for a chat, unset ones
    /// included.
    #[must_use]
    pub fn raw_len(&self, chat_id: ChatId) -> usize {
        self.records
            .read()
            .map(|records| records.get(&chat_id).map_or(0, |r| r.tokens.len()))
            .unwrap_or(0)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Internal(e.to_string())
}

#[async_trait]
impl CredentialStorage for MemoryStorage {
    async fn find(&self, chat_id: ChatId) -> Result<Option<CredentialRecord>, StorageError> {
        let records = self.records.read().map_err(poisoned)?;

        Ok(records.get(&chat_id).map(|stored| CredentialRecord {
            chat_id,
            tokens: stored.tokens.iter().flatten().cloned().collect(),
            timestamps: stored.timestamps.iter().flatten().copied().collect(),
        }))
    }

    async fn push(
        &self,
        chat_id: ChatId,
        token: &str,
        created_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut records = self.records.write().map_err(poisoned)?;

        let stored = records.entry(chat_id).or_default();
        stored.tokens.push(Some(token.to_string()));
        stored.timestamps.push(Some(created_at));

        Ok(())
    }

    async fn unset(&self, chat_id: ChatId, index: usize) -> Result<bool, StorageError> {
        let mut records = self.records.write().map_err(poisoned)?;

        let Some(stored) = records.get_mut(&chat_id) else {
            return Ok(false);
        };

        // `index` counts live slots only, as listed by `find`.
        let Some(slot) = stored
            .tokens
            .iter()
            .enumerate()
            .filter(|(_, token)| token.is_some())
            .nth(index)
            .map(|(slot, _)| slot)
        else {
            return Ok(false);
        };

        stored.tokens[slot] = None;
        if let Some(ts) = stored.timestamps.get_mut(slot) {
            *ts = None;
        }
        Ok(true)
    }

    async fn compact(&self, chat_id: ChatId) -> Result<(), StorageError> {
        let mut records = self.records.write().map_err(poisoned)?;

        if let Some(stored) = records.get_mut(&chat_id) {
            stored.tokens.retain(Option::is_some);
            stored.timestamps.retain(Option::is_some);
        }

        Ok(())
    }
}
