use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::storage::codec::{decode_record, encode_record};
use crate::storage::errors::StorageError;
use crate::storage::types::SessionRecord;
use crate::utils::{gen_random_string, is_valid_session_id};

use super::types::{Mutation, SessionStore};

pub const SESSION_FILE_EXT: &str = "session";
const TEMP_FILE_EXT: &str = "tmp";

/// One file per session plus an in-memory cache filled lazily from disk.
///
/// Every read-modify-write of one id runs under that id's entry in
/// `id_locks`, so writes to different sessions hit the disk in parallel.
/// Lock order is the id lock, then `cache`, then `id_locks`. The `cache` and
/// `id_locks` mutexes only ever cover map access. The cache is updated after
/// the disk write succeeds, so a failed write is never served.
pub struct FileSessionStore {
    dir: PathBuf,
    window: Duration,
    cache: Mutex<HashMap<String, SessionRecord>>,
    id_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>, window: Duration) -> Self {
        let mut dir = dir.into();
        if dir.is_relative() {
            if let Ok(cwd) = std::env::current_dir() {
                dir = cwd.join(dir);
            }
        }
        tracing::info!("Creating file session store in {}", dir.display());
        Self {
            dir,
            window,
            cache: Mutex::new(HashMap::new()),
            id_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{SESSION_FILE_EXT}"))
    }

    fn session_id_from_path(path: &Path) -> Option<String> {
        if path.extension()? != SESSION_FILE_EXT {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        is_valid_session_id(stem).then(|| stem.to_string())
    }

    /// Matches `<id>.<suffix>.tmp` as written by `write_atomic`.
    fn is_temp_file(path: &Path) -> bool {
        if path.extension().is_none_or(|ext| ext != TEMP_FILE_EXT) {
            return false;
        }
        path.file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.split_once('.'))
            .is_some_and(|(id, _)| is_valid_session_id(id))
    }

    fn check_id(id: &str) -> Result<(), StorageError> {
        if is_valid_session_id(id) {
            Ok(())
        } else {
            Err(StorageError::InvalidInput(format!(
                "Malformed session id: {id:?}"
            )))
        }
    }

    async fn id_lock(&self, id: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.id_locks.lock().await.entry(id.to_string()).or_default())
    }

    /// Drops the id lock once nothing is cached for `id` and no other task
    /// holds a clone. Clones are only handed out under `id_locks`.
    async fn release_id_lock(&self, id: &str, lock: &Arc<Mutex<()>>) {
        let cache = self.cache.lock().await;
        let mut locks = self.id_locks.lock().await;
        // One reference in the map, one held by the caller.
        if !cache.contains_key(id) && Arc::strong_count(lock) <= 2 {
            locks.remove(id);
        }
    }

    /// Returns the cached record, reading it from disk on a miss. The result
    /// may be expired; callers decide what that means. Caller holds the id
    /// lock.
    async fn load_locked(&self, id: &str) -> Result<Option<SessionRecord>, StorageError> {
        if let Some(record) = self.cache.lock().await.get(id).cloned() {
            return Ok(Some(record));
        }
        let Some(record) = self.read_file(id).await? else {
            return Ok(None);
        };
        self.cache
            .lock()
            .await
            .insert(id.to_string(), record.clone());
        tracing::debug!("Loaded session {} from disk", id);
        Ok(Some(record))
    }

    /// Caller holds the id lock.
    async fn read_file(&self, id: &str) -> Result<Option<SessionRecord>, StorageError> {
        let path = self.session_path(id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match decode_record(&bytes) {
            Ok(record) if record.id == id => Ok(Some(record)),
            Ok(_) | Err(_) => {
                tracing::warn!("Discarding corrupt session file {}", path.display());
                self.remove_file(id).await?;
                Ok(None)
            }
        }
    }

    /// Writes `record` to disk, then caches it. Caller holds the id lock.
    async fn store_locked(&self, record: &SessionRecord) -> Result<(), StorageError> {
        self.write_atomic(&record.id, &encode_record(record)?).await?;
        self.cache
            .lock()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update_locked(
        &self,
        id: &str,
        mutation: Mutation,
    ) -> Result<Option<SessionRecord>, StorageError> {
        let Some(mut record) = self.load_locked(id).await? else {
            return Ok(None);
        };
        if record.is_expired() {
            self.cache.lock().await.remove(id);
            return Ok(None);
        }
        mutation(&mut record);
        record.touch(self.window);
        self.store_locked(&record).await?;
        Ok(Some(record))
    }

    /// Check-and-delete for one file. Caller holds the id lock.
    async fn sweep_one(&self, id: &str, path: &Path) -> Result<bool, StorageError> {
        if let Some(cached) = self.cache.lock().await.get(id) {
            if !cached.is_expired() {
                return Ok(false);
            }
        }

        let stale = match fs::read(path).await {
            Ok(bytes) => decode_record(&bytes)
                .map(|record| record.is_expired() || record.id != id)
                .unwrap_or(true),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                tracing::warn!("Skipping unreadable session file {}: {}", path.display(), e);
                return Ok(false);
            }
        };

        if stale {
            self.remove_file(id).await?;
            self.cache.lock().await.remove(id);
        }
        Ok(stale)
    }

    /// Removes a temp file orphaned by an interrupted write once it is older
    /// than the sliding window. Younger ones may belong to a write in flight.
    async fn sweep_temp_file(&self, path: &Path) {
        let max_age = self.window.to_std().unwrap_or_default();
        let modified = match fs::metadata(path).await.and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                tracing::debug!("Skipping temp file {}: {}", path.display(), e);
                return;
            }
        };
        let old = SystemTime::now()
            .duration_since(modified)
            .is_ok_and(|age| age >= max_age);
        if !old {
            return;
        }
        match fs::remove_file(path).await {
            Ok(()) => tracing::debug!("Removed orphaned temp file {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove temp file {}: {}", path.display(), e),
        }
    }

    /// Temp file in the same directory, synced, then renamed over the target.
    async fn write_atomic(&self, id: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let suffix = gen_random_string(6).map_err(|e| StorageError::Backend(e.to_string()))?;
        let temp_path = self.dir.join(format!("{id}.{suffix}.{TEMP_FILE_EXT}"));
        let final_path = self.session_path(id);

        let result = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &final_path).await
        }
        .await;

        if let Err(e) = result {
            tracing::error!("Failed to write session file {}: {}", final_path.display(), e);
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove_file(&self, id: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.session_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn init(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    async fn start_session(&self, id: &str) -> Result<SessionRecord, StorageError> {
        Self::check_id(id)?;
        let record = SessionRecord::new(id, self.window);
        let lock = self.id_lock(id).await;
        let result = {
            let _guard = lock.lock().await;
            self.store_locked(&record).await
        };
        self.release_id_lock(id, &lock).await;
        result.map(|()| record)
    }

    async fn get_session(&self, id: &str) -> Result<Option<SessionRecord>, StorageError> {
        if !is_valid_session_id(id) {
            return Ok(None);
        }
        let cached = self.cache.lock().await.get(id).cloned();
        let record = match cached {
            Some(record) => Some(record),
            None => {
                let lock = self.id_lock(id).await;
                let result = {
                    let _guard = lock.lock().await;
                    self.load_locked(id).await
                };
                self.release_id_lock(id, &lock).await;
                result?
            }
        };

        match record {
            Some(record) if record.is_expired() => {
                tracing::debug!("Session {} expired at {}", id, record.expires_at);
                self.cache.lock().await.remove(id);
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn update(
        &self,
        id: &str,
        mutation: Mutation,
    ) -> Result<Option<SessionRecord>, StorageError> {
        if !is_valid_session_id(id) {
            return Ok(None);
        }
        let lock = self.id_lock(id).await;
        let result = {
            let _guard = lock.lock().await;
            self.update_locked(id, mutation).await
        };
        self.release_id_lock(id, &lock).await;
        result
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), StorageError> {
        Self::check_id(&record.id)?;
        let lock = self.id_lock(&record.id).await;
        let result = {
            let _guard = lock.lock().await;
            self.store_locked(record).await
        };
        self.release_id_lock(&record.id, &lock).await;
        result
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        if !is_valid_session_id(id) {
            return Ok(());
        }
        let lock = self.id_lock(id).await;
        let result = {
            let _guard = lock.lock().await;
            let removed = self.remove_file(id).await;
            if removed.is_ok() {
                self.cache.lock().await.remove(id);
            }
            removed
        };
        self.release_id_lock(id, &lock).await;
        result
    }

    async fn sweep_expired(&self) -> Result<usize, StorageError> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if Self::is_temp_file(&path) {
                self.sweep_temp_file(&path).await;
                continue;
            }
            let Some(id) = Self::session_id_from_path(&path) else {
                continue;
            };

            // One file's check-and-delete per lock hold.
            let lock = self.id_lock(&id).await;
            let result = {
                let _guard = lock.lock().await;
                self.sweep_one(&id, &path).await
            };
            self.release_id_lock(&id, &lock).await;
            if result? {
                removed += 1;
            }
        }

        let mut cache = self.cache.lock().await;
        cache.retain(|_, record| !record.is_expired());
        self.id_locks
            .lock()
            .await
            .retain(|id, lock| cache.contains_key(id) || Arc::strong_count(lock) > 1);
        Ok(removed)
    }
}
