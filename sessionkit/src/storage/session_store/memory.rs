use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::Mutex;

use crate::storage::errors::StorageError;
use crate::storage::types::SessionRecord;

use super::types::{Mutation, SessionStore};

/// Process-local store with the same semantics as the persistent ones.
pub struct MemorySessionStore {
    entry: Mutex<HashMap<String, SessionRecord>>,
    window: Duration,
}

impl MemorySessionStore {
    pub fn new(window: Duration) -> Self {
        tracing::info!("Creating new in-memory session store");
        Self {
            entry: Mutex::new(HashMap::new()),
            window,
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn init(&self) -> Result<(), StorageError> {
        Ok(()) // Nothing to initialize for in-memory store
    }

    async fn start_session(&self, id: &str) -> Result<SessionRecord, StorageError> {
        let record = SessionRecord::new(id, self.window);
        self.entry
            .lock()
            .await
            .insert(id.to_string(), record.clone());
        Ok(record)
    }

    async fn get_session(&self, id: &str) -> Result<Option<SessionRecord>, StorageError> {
        let mut entry = self.entry.lock().await;
        match entry.get(id) {
            Some(record) if record.is_expired() => {
                entry.remove(id);
                Ok(None)
            }
            Some(record) => Ok(Some(record.clone())),
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        id: &str,
        mutation: Mutation,
    ) -> Result<Option<SessionRecord>, StorageError> {
        let mut entry = self.entry.lock().await;
        let Some(record) = entry.get_mut(id) else {
            return Ok(None);
        };
        if record.is_expired() {
            entry.remove(id);
            return Ok(None);
        }
        mutation(record);
        record.touch(self.window);
        Ok(Some(record.clone()))
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), StorageError> {
        self.entry
            .lock()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.entry.lock().await.remove(id);
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<usize, StorageError> {
        let mut entry = self.entry.lock().await;
        let before = entry.len();
        entry.retain(|_, record| !record.is_expired());
        Ok(before - entry.len())
    }
}
