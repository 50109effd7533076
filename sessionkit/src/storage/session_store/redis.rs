use async_trait::async_trait;
use chrono::{Duration, Utc};
use redis::{self, AsyncCommands};

use crate::storage::codec::{decode_record, encode_record};
use crate::storage::errors::StorageError;
use crate::storage::types::SessionRecord;
use crate::utils::is_valid_session_id;

use super::types::{Mutation, SessionStore};

/// Remote key-value store: key is the session id, value the encoded record,
/// expiry delegated to the server's TTL.
///
/// Nothing is cached or locked locally. `update` is GET, mutate, SET of the
/// whole record, so two requests changing the same session at the same time
/// can lose one of the changes (last write wins).
pub struct RedisSessionStore {
    client: redis::Client,
    window: Duration,
}

impl RedisSessionStore {
    pub fn new(client: redis::Client, window: Duration) -> Self {
        Self { client, window }
    }

    pub fn open(url: &str, window: Duration) -> Result<Self, StorageError> {
        let client = redis::Client::open(url)?;
        Ok(Self::new(client, window))
    }

    /// Seconds left on the record, never below one so SET EX stays valid.
    fn ttl_secs(record: &SessionRecord) -> u64 {
        (record.expires_at - Utc::now()).num_seconds().max(1) as u64
    }

    async fn put(&self, record: &SessionRecord) -> Result<(), StorageError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let bytes = encode_record(record)?;
        let _: () = conn
            .set_ex(&record.id, bytes, Self::ttl_secs(record))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn init(&self) -> Result<(), StorageError> {
        // Verify the connection works
        let _conn = self.client.get_multiplexed_async_connection().await?;
        Ok(())
    }

    async fn start_session(&self, id: &str) -> Result<SessionRecord, StorageError> {
        if !is_valid_session_id(id) {
            return Err(StorageError::InvalidInput(format!(
                "Malformed session id: {id:?}"
            )));
        }
        let record = SessionRecord::new(id, self.window);
        self.put(&record).await?;
        Ok(record)
    }

    async fn get_session(&self, id: &str) -> Result<Option<SessionRecord>, StorageError> {
        if !is_valid_session_id(id) {
            return Ok(None);
        }
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let bytes: Option<Vec<u8>> = conn.get(id).await?;
        let Some(bytes) = bytes else {
            return Ok(None);
        };

        match decode_record(&bytes) {
            Ok(record) if record.id == id && !record.is_expired() => Ok(Some(record)),
            Ok(record) if record.id == id => {
                tracing::debug!("Session {} expired at {}", id, record.expires_at);
                Ok(None)
            }
            Ok(_) | Err(_) => {
                tracing::warn!("Discarding corrupt session payload for {}", id);
                let _: () = conn.del(id).await?;
                Ok(None)
            }
        }
    }

    async fn update(
        &self,
        id: &str,
        mutation: Mutation,
    ) -> Result<Option<SessionRecord>, StorageError> {
        let Some(mut record) = self.get_session(id).await? else {
            return Ok(None);
        };
        mutation(&mut record);
        record.touch(self.window);
        self.put(&record).await?;
        Ok(Some(record))
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), StorageError> {
        if !is_valid_session_id(&record.id) {
            return Err(StorageError::InvalidInput(format!(
                "Malformed session id: {:?}",
                record.id
            )));
        }
        self.put(record).await
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(id).await?;
        Ok(())
    }
}
