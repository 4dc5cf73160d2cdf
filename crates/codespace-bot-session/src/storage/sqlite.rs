//! SQLite credential storage (feature-gated).
//!
//! One row per chat. `tokens` and `timestamps` are JSON arrays so that each
//! trait method maps to a single statement and both arrays always change
//! together.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use codespace_bot_core::{ChatId, CredentialRecord, CredentialStorage, StorageError};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS user_tokens (
    chat_id    INTEGER PRIMARY KEY,
    tokens     TEXT NOT NULL DEFAULT '[]',
    timestamps TEXT NOT NULL DEFAULT '[]'
)";

const PUSH: &str = r"
INSERT INTO user_tokens (chat_id, tokens, timestamps)
VALUES (?1, json_array(?2), json_array(?3))
ON CONFLICT (chat_id) DO UPDATE SET
    tokens     = json_insert(user_tokens.tokens, '$[#]', ?2),
    timestamps = json_insert(user_tokens.timestamps, '$[#]', ?3)";

// ?2 counts live slots only, so holes left by a failed compaction are
// skipped. Both SET expressions see the row as it was before the update.
const UNSET: &str = r"
UPDATE user_tokens SET
    tokens     = json_set(tokens, '$[' || (
        SELECT key FROM json_each(user_tokens.tokens)
        WHERE type <> 'null' ORDER BY key LIMIT 1 OFFSET ?2
    ) || ']', NULL),
    timestamps = json_set(timestamps, '$[' || (
        SELECT key FROM json_each(user_tokens.tokens)
        WHERE type <> 'null' ORDER BY key LIMIT 1 OFFSET ?2
    ) || ']', NULL)
WHERE chat_id = ?1
  AND (
        SELECT key FROM json_each(user_tokens.tokens)
        WHERE type <> 'null' ORDER BY key LIMIT 1 OFFSET ?2
  ) IS NOT NULL";

const COMPACT: &str = r"
UPDATE user_tokens SET
    tokens     = (SELECT json_group_array(value) FROM json_each(user_tokens.tokens) WHERE type <> 'null'),
    timestamps = (SELECT json_group_array(value) FROM json_each(user_tokens.timestamps) WHERE type <> 'null')
WHERE chat_id = ?1";

fn db_error(e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StorageError::Unavailable(e.to_string())
        }
        other => StorageError::Internal(other.to_string()),
    }
}

/// SQLite storage implementation.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Connect and create the schema if needed.
    ///
    /// # Errors
    /// Returns error if database connection or schema creation fails.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .connect(database_url)
            .await
            .map_err(db_error)?;
        Self::from_pool(pool).await
    }

    /// Private in-memory database, kept alive on a single connection.
    ///
    /// # Errors
    /// Returns error if the database cannot be opened.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(db_error)?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and create the schema if needed.
    ///
    /// # Errors
    /// Returns error if schema creation fails.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(db_error)?;
        Ok(Self { pool })
    }

    /// Close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn parse_slots<T: serde::de::DeserializeOwned>(
    chat_id: ChatId,
    raw: &str,
) -> Result<Vec<T>, StorageError> {
    let slots: Vec<Option<T>> =
        serde_json::from_str(raw).map_err(|e| StorageError::Corrupt {
            chat_id,
            reason: e.to_string(),
        })?;
    Ok(slots.into_iter().flatten().collect())
}

#[async_trait]
impl CredentialStorage for SqliteStorage {
    async fn find(&self, chat_id: ChatId) -> Result<Option<CredentialRecord>, StorageError> {
        let row = sqlx::query_as::<_, (String, String)>(
            "SELECT tokens, timestamps FROM user_tokens WHERE chat_id = ?1",
        )
        .bind(chat_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        let Some((tokens, timestamps)) = row else {
            return Ok(None);
        };

        let record = CredentialRecord {
            chat_id,
            tokens: parse_slots(chat_id, &tokens)?,
            timestamps: parse_slots::<DateTime<Utc>>(chat_id, &timestamps)?,
        };

        if !record.is_aligned() {
            return Err(StorageError::Corrupt {
                chat_id,
                reason: format!(
                    "{} tokens but {} timestamps",
                    record.tokens.len(),
                    record.timestamps.len()
                ),
            });
        }

        Ok(Some(record))
    }

    async fn push(
        &self,
        chat_id: ChatId,
        token: &str,
        created_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(PUSH)
            .bind(chat_id.0)
            .bind(token)
            .bind(created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn unset(&self, chat_id: ChatId, index: usize) -> Result<bool, StorageError> {
        let Ok(index) = i64::try_from(index) else {
            return Ok(false);
        };

        let result = sqlx::query(UNSET)
            .bind(chat_id.0)
            .bind(index)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn compact(&self, chat_id: ChatId) -> Result<(), StorageError> {
        sqlx::query(COMPACT)
            .bind(chat_id.0)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}
