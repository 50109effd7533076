use std::collections::HashMap;
use std::sync::Arc;

use http::HeaderValue;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::session::errors::SessionError;
use crate::storage::{Mutation, SessionRecord, Value, from_value, to_value};

use super::csrf::{CSRF_SESSION_KEY, gen_csrf_token};
use super::manager::SessionManager;

/// Selects one namespace of a record, e.g. its flash map.
pub(super) type Namespace<V> = fn(&mut SessionRecord) -> &mut HashMap<String, V>;

pub(super) struct HandleState {
    pub(super) record: SessionRecord,
    set_cookie: Option<HeaderValue>,
}

/// The session bound to one request/response pair.
///
/// Reads are served from the copy loaded when the request arrived; every
/// write goes through to the store and queues a refreshed cookie.
#[derive(Clone)]
pub struct SessionHandle {
    manager: Arc<SessionManager>,
    state: Arc<Mutex<HandleState>>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").finish_non_exhaustive()
    }
}

impl SessionHandle {
    pub(crate) fn new(
        manager: Arc<SessionManager>,
        record: SessionRecord,
        set_cookie: Option<HeaderValue>,
    ) -> Self {
        Self {
            manager,
            state: Arc::new(Mutex::new(HandleState { record, set_cookie })),
        }
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    pub async fn id(&self) -> String {
        self.state.lock().await.record.id.clone()
    }

    /// Snapshot of the locally held record.
    pub async fn record(&self) -> SessionRecord {
        self.state.lock().await.record.clone()
    }

    /// Drains the `Set-Cookie` value queued by the last write, if any.
    pub async fn take_set_cookie(&self) -> Option<HeaderValue> {
        self.state.lock().await.set_cookie.take()
    }

    pub async fn get_value(&self, key: &str) -> Option<Value> {
        self.state.lock().await.record.values.get(key).cloned()
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SessionError> {
        self.get_value(key)
            .await
            .map(|value| from_value(&value))
            .transpose()
            .map_err(SessionError::from)
    }

    pub async fn set_value(&self, key: &str, value: Value) -> Result<(), SessionError> {
        let key = key.to_string();
        self.apply(Arc::new(move |record: &mut SessionRecord| {
            record.values.insert(key.clone(), value.clone());
        }))
        .await
    }

    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), SessionError> {
        self.set_value(key, to_value(value)?).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), SessionError> {
        let key = key.to_string();
        self.apply(Arc::new(move |record: &mut SessionRecord| {
            record.values.remove(&key);
        }))
        .await
    }

    /// The session's anti-forgery token, minted and stored if missing.
    pub async fn get_csrf(&self) -> Result<String, SessionError> {
        let mut state = self.state.lock().await;
        if let Some(Value::Text(token)) = state.record.values.get(CSRF_SESSION_KEY) {
            return Ok(token.clone());
        }
        let token = gen_csrf_token()?;
        self.apply_locked(&mut state, csrf_mutation(token.clone()))
            .await?;
        Ok(token)
    }

    /// The current token, without minting one.
    pub async fn peek_csrf(&self) -> Option<String> {
        match self.state.lock().await.record.values.get(CSRF_SESSION_KEY) {
            Some(Value::Text(token)) => Some(token.clone()),
            _ => None,
        }
    }

    /// Replaces the token. An empty `token` mints a fresh one.
    pub async fn set_csrf(&self, token: &str) -> Result<String, SessionError> {
        let token = if token.is_empty() {
            gen_csrf_token()?
        } else {
            token.to_string()
        };
        self.apply(csrf_mutation(token.clone())).await?;
        Ok(token)
    }

    pub async fn remove_csrf(&self) -> Result<(), SessionError> {
        self.remove(CSRF_SESSION_KEY).await
    }

    /// Moves everything into a session under a new id and destroys the old
    /// one. Call after a privilege change.
    pub async fn regenerate(&self, mint_csrf: bool) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        let new_id = self.manager.generate_id()?;
        let mut record = state
            .record
            .carry_over(new_id, self.manager.config().length);
        if mint_csrf {
            record
                .values
                .insert(CSRF_SESSION_KEY.to_string(), Value::Text(gen_csrf_token()?));
        }
        self.replace_locked(&mut state, record).await
    }

    /// Starts over under a new id holding nothing but a fresh CSRF token,
    /// destroying the old session.
    pub async fn regenerate_new(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        let mut record =
            SessionRecord::new(self.manager.generate_id()?, self.manager.config().length);
        record
            .values
            .insert(CSRF_SESSION_KEY.to_string(), Value::Text(gen_csrf_token()?));
        self.replace_locked(&mut state, record).await
    }

    async fn replace_locked(
        &self,
        state: &mut HandleState,
        record: SessionRecord,
    ) -> Result<(), SessionError> {
        let old_id = state.record.id.clone();
        self.manager.save(&record).await?;
        self.manager.delete(&old_id).await?;
        tracing::debug!("Regenerated session id");

        state.set_cookie = Some(self.manager.session_cookie(&record)?);
        state.record = record;
        Ok(())
    }

    pub(super) async fn apply(&self, mutation: Mutation) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        self.apply_locked(&mut state, mutation).await
    }

    /// Runs `mutation` through the store and adopts the stored result.
    ///
    /// A session that vanished since the request arrived is replaced by a
    /// fresh one carrying just this mutation.
    pub(super) async fn apply_locked(
        &self,
        state: &mut HandleState,
        mutation: Mutation,
    ) -> Result<(), SessionError> {
        let updated = match self
            .manager
            .update(&state.record.id, Arc::clone(&mutation))
            .await?
        {
            Some(record) => record,
            None => {
                tracing::debug!("Session vanished mid-request, starting a fresh one");
                let fresh = self.manager.start_session().await?;
                self.manager
                    .update(&fresh.id, mutation)
                    .await?
                    .ok_or_else(|| {
                        SessionError::Storage("Fresh session disappeared".to_string())
                    })?
            }
        };

        state.set_cookie = Some(self.manager.session_cookie(&updated)?);
        state.record = updated;
        Ok(())
    }

    pub(super) async fn lock(&self) -> tokio::sync::MutexGuard<'_, HandleState> {
        self.state.lock().await
    }

    /// Reads one entry of `ns` without consuming it.
    pub(super) async fn peek_entry<V: Clone + 'static>(
        &self,
        ns: Namespace<V>,
        key: &str,
    ) -> Option<V> {
        ns(&mut self.lock().await.record).get(key).cloned()
    }

    pub(super) async fn peek_entries<V: Clone + 'static>(
        &self,
        ns: Namespace<V>,
    ) -> HashMap<String, V> {
        ns(&mut self.lock().await.record).clone()
    }

    /// Returns one entry of `ns` and deletes it from the session.
    pub(super) async fn take_entry<V: Clone + Send + Sync + 'static>(
        &self,
        ns: Namespace<V>,
        key: &str,
    ) -> Result<Option<V>, SessionError> {
        let mut state = self.lock().await;
        let Some(value) = ns(&mut state.record).get(key).cloned() else {
            return Ok(None);
        };
        let key = key.to_string();
        self.apply_locked(
            &mut state,
            Arc::new(move |record: &mut SessionRecord| {
                ns(record).remove(&key);
            }),
        )
        .await?;
        Ok(Some(value))
    }

    /// Returns every entry of `ns` and empties it.
    pub(super) async fn take_entries<V: Clone + Send + Sync + 'static>(
        &self,
        ns: Namespace<V>,
    ) -> Result<HashMap<String, V>, SessionError> {
        let mut state = self.lock().await;
        let entries = ns(&mut state.record).clone();
        if !entries.is_empty() {
            self.clear_locked(&mut state, ns).await?;
        }
        Ok(entries)
    }

    pub(super) async fn clear_locked<V: Send + Sync + 'static>(
        &self,
        state: &mut HandleState,
        ns: Namespace<V>,
    ) -> Result<(), SessionError> {
        self.apply_locked(
            state,
            Arc::new(move |record: &mut SessionRecord| ns(record).clear()),
        )
        .await
    }
}

fn csrf_mutation(token: String) -> Mutation {
    Arc::new(move |record: &mut SessionRecord| {
        record
            .values
            .insert(CSRF_SESSION_KEY.to_string(), Value::Text(token.clone()));
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::storage::{FileSessionStore, MemorySessionStore};
    use crate::test_utils::{memory_manager, request_with_session};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct AuthData {
        user_id: u64,
        username: String,
        roles: Vec<String>,
    }

    fn ada() -> AuthData {
        AuthData {
            user_id: 7,
            username: "Ada".to_string(),
            roles: vec!["admin".to_string()],
        }
    }

    #[tokio::test]
    async fn test_set_then_get_reads_local_copy() {
        let manager = memory_manager().await;
        let handle = manager.resolve(&http::HeaderMap::new()).await.unwrap();

        handle.set("auth", &ada()).await.unwrap();
        assert_eq!(handle.get::<AuthData>("auth").await.unwrap(), Some(ada()));
        assert_eq!(handle.get::<AuthData>("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_custom_type_survives_reload_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SessionConfig::default();
        let store = FileSessionStore::new(tmp.path(), config.length);
        let manager = Arc::new(SessionManager::with_store(store, config.clone()).await.unwrap());

        let handle = manager.resolve(&http::HeaderMap::new()).await.unwrap();
        handle.set("auth", &ada()).await.unwrap();
        let id = handle.id().await;

        // A second manager over the same directory starts with a cold cache.
        let reopened = FileSessionStore::new(tmp.path(), config.length);
        let reopened = Arc::new(SessionManager::with_store(reopened, config).await.unwrap());
        let handle = reopened
            .resolve(&request_with_session(&reopened, &id))
            .await
            .unwrap();

        assert_eq!(handle.id().await, id);
        assert_eq!(handle.get::<AuthData>("auth").await.unwrap(), Some(ada()));
    }

    #[tokio::test]
    async fn test_get_with_wrong_type_is_codec_error() {
        let manager = memory_manager().await;
        let handle = manager.resolve(&http::HeaderMap::new()).await.unwrap();
        handle.set("count", "three").await.unwrap();

        let result = handle.get::<u32>("count").await;
        assert!(matches!(result, Err(SessionError::Codec(_))));
    }

    #[tokio::test]
    async fn test_every_write_queues_refreshed_cookie() {
        let manager = memory_manager().await;
        let record = manager.start_session().await.unwrap();
        let handle = manager
            .resolve(&request_with_session(&manager, &record.id))
            .await
            .unwrap();
        assert!(handle.take_set_cookie().await.is_none());

        handle.set("k", "v").await.unwrap();
        assert!(handle.take_set_cookie().await.is_some());

        handle.remove("k").await.unwrap();
        assert!(handle.take_set_cookie().await.is_some());
        assert!(handle.get_value("k").await.is_none());
        assert!(manager.get_value(&record.id, "k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_slides_expiry() {
        let manager = memory_manager().await;
        let mut record = manager.start_session().await.unwrap();
        record.expires_at = chrono::Utc::now() + chrono::Duration::minutes(1);
        manager.save(&record).await.unwrap();

        let handle = manager
            .resolve(&request_with_session(&manager, &record.id))
            .await
            .unwrap();
        handle.set("k", "v").await.unwrap();

        assert!(handle.record().await.expires_at > record.expires_at);
    }

    #[tokio::test]
    async fn test_vanished_session_is_recreated_transparently() {
        let manager = memory_manager().await;
        let handle = manager.resolve(&http::HeaderMap::new()).await.unwrap();
        let old_id = handle.id().await;
        handle.take_set_cookie().await;

        manager.delete(&old_id).await.unwrap();
        handle.set("k", "v").await.unwrap();

        let new_id = handle.id().await;
        assert_ne!(new_id, old_id);
        assert_eq!(handle.get::<String>("k").await.unwrap().as_deref(), Some("v"));
        let cookie = handle.take_set_cookie().await.unwrap();
        assert!(cookie.to_str().unwrap().contains(&new_id));
        assert!(manager.get_value(&new_id, "k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_get_csrf_mints_once() {
        let manager = memory_manager().await;
        let handle = manager.resolve(&http::HeaderMap::new()).await.unwrap();
        assert!(handle.peek_csrf().await.is_none());

        let token = handle.get_csrf().await.unwrap();
        assert_eq!(handle.get_csrf().await.unwrap(), token);
        assert_eq!(handle.peek_csrf().await, Some(token.clone()));

        let stored = manager
            .get_value(&handle.id().await, CSRF_SESSION_KEY)
            .await
            .unwrap();
        assert_eq!(stored, Some(Value::Text(token)));
    }

    #[tokio::test]
    async fn test_set_csrf_empty_generates_fresh_token() {
        let manager = memory_manager().await;
        let handle = manager.resolve(&http::HeaderMap::new()).await.unwrap();
        let first = handle.get_csrf().await.unwrap();

        let fresh = handle.set_csrf("").await.unwrap();
        assert_ne!(fresh, first);
        assert_eq!(handle.peek_csrf().await, Some(fresh));

        assert_eq!(handle.set_csrf("chosen").await.unwrap(), "chosen");
        handle.remove_csrf().await.unwrap();
        assert!(handle.peek_csrf().await.is_none());
    }

    #[tokio::test]
    async fn test_regenerate_carries_values_and_retires_old_id() {
        let manager = memory_manager().await;
        let handle = manager.resolve(&http::HeaderMap::new()).await.unwrap();
        handle.set("auth", &ada()).await.unwrap();
        handle.set_flash("notice", "welcome").await.unwrap();
        let token = handle.get_csrf().await.unwrap();
        let old_id = handle.id().await;
        handle.take_set_cookie().await;

        handle.regenerate(false).await.unwrap();

        let new_id = handle.id().await;
        assert_ne!(new_id, old_id);
        assert!(manager.get_session_by_id(&old_id).await.unwrap().is_none());

        let cookie = handle.take_set_cookie().await.unwrap();
        assert!(cookie.to_str().unwrap().starts_with(&format!("session_id={new_id};")));

        let reloaded = manager
            .resolve(&request_with_session(&manager, &new_id))
            .await
            .unwrap();
        assert_eq!(reloaded.get::<AuthData>("auth").await.unwrap(), Some(ada()));
        assert_eq!(reloaded.peek_csrf().await, Some(token));
        assert_eq!(
            reloaded.peek_flash::<String>("notice").await.unwrap().as_deref(),
            Some("welcome")
        );
    }

    #[tokio::test]
    async fn test_regenerate_can_mint_csrf() {
        let manager = memory_manager().await;
        let handle = manager.resolve(&http::HeaderMap::new()).await.unwrap();
        let token = handle.get_csrf().await.unwrap();

        handle.regenerate(true).await.unwrap();

        let fresh = handle.peek_csrf().await.unwrap();
        assert_ne!(fresh, token);
    }

    #[tokio::test]
    async fn test_regenerate_new_keeps_only_fresh_csrf() {
        let manager = memory_manager().await;
        let handle = manager.resolve(&http::HeaderMap::new()).await.unwrap();
        handle.set("auth", &ada()).await.unwrap();
        handle.set_flash("notice", "bye").await.unwrap();
        handle.add_field_error("email", "taken").await.unwrap();
        let token = handle.get_csrf().await.unwrap();
        let old_id = handle.id().await;

        handle.regenerate_new().await.unwrap();

        let new_id = handle.id().await;
        assert!(manager.get_session_by_id(&old_id).await.unwrap().is_none());

        let stored = manager.get_session_by_id(&new_id).await.unwrap().unwrap();
        assert_eq!(stored.values.len(), 1);
        let fresh = match stored.values.get(CSRF_SESSION_KEY) {
            Some(Value::Text(t)) => t.clone(),
            other => panic!("expected csrf token, got {other:?}"),
        };
        assert_ne!(fresh, token);
        assert!(stored.flash.is_empty());
        assert!(stored.field_errors.is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let config = SessionConfig::default();
        let store = MemorySessionStore::new(config.length);
        let manager = Arc::new(SessionManager::with_store(store, config).await.unwrap());
        let handle = manager.resolve(&http::HeaderMap::new()).await.unwrap();
        let clone = handle.clone();

        clone.set("k", "v").await.unwrap();
        assert!(handle.get_value("k").await.is_some());
    }
}
