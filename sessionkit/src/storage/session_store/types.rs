use std::sync::Arc;

use async_trait::async_trait;

use crate::storage::errors::StorageError;
use crate::storage::types::{SessionRecord, Value};

/// A change applied to a live record by [`SessionStore::update`].
///
/// Shared rather than boxed so the handle can apply the same change to its
/// local copy and, if the session vanished, to a freshly started one.
pub type Mutation = Arc<dyn Fn(&mut SessionRecord) + Send + Sync>;

/// Persistence capability behind the session manager.
///
/// "Absent" covers a missing id, an expired record and an undecodable
/// payload alike; only backend failures are reported as errors.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Initialize the store. Called once when the manager is built.
    async fn init(&self) -> Result<(), StorageError>;

    /// Persists an empty record under `id` expiring one window from now.
    async fn start_session(&self, id: &str) -> Result<SessionRecord, StorageError>;

    /// Loads the live record for `id`.
    async fn get_session(&self, id: &str) -> Result<Option<SessionRecord>, StorageError>;

    /// Read-modify-write of one live record: applies `mutation`, slides the
    /// expiry forward and persists. Returns the stored result, or `None` when
    /// there was no live record to change.
    async fn update(
        &self,
        id: &str,
        mutation: Mutation,
    ) -> Result<Option<SessionRecord>, StorageError>;

    /// Replaces the whole record, keyed by `record.id`.
    async fn save(&self, record: &SessionRecord) -> Result<(), StorageError>;

    /// Destroys the record. Deleting an absent id is not an error.
    async fn delete(&self, id: &str) -> Result<(), StorageError>;

    /// Removes expired and undecodable records, returning how many went.
    async fn sweep_expired(&self) -> Result<usize, StorageError> {
        Ok(0)
    }

    async fn set_value(&self, id: &str, key: &str, value: Value) -> Result<bool, StorageError> {
        let key = key.to_string();
        let mutation: Mutation = Arc::new(move |record: &mut SessionRecord| {
            record.values.insert(key.clone(), value.clone());
        });
        Ok(self.update(id, mutation).await?.is_some())
    }

    async fn get_value(&self, id: &str, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self
            .get_session(id)
            .await?
            .and_then(|mut record| record.values.remove(key)))
    }

    async fn remove(&self, id: &str, key: &str) -> Result<bool, StorageError> {
        let key = key.to_string();
        let mutation: Mutation = Arc::new(move |record: &mut SessionRecord| {
            record.values.remove(&key);
        });
        Ok(self.update(id, mutation).await?.is_some())
    }
}
