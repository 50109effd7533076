use std::sync::Arc;
use std::time::Duration;

use http::{HeaderMap, HeaderValue};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::SessionConfig;
use crate::session::errors::SessionError;
use crate::storage::{Mutation, SessionRecord, SessionStore, Value, build_store};
use crate::utils::gen_session_id;

use super::cookie::{expired_cookie, session_cookie, session_id_from_headers};
use super::handle::SessionHandle;

/// Owns the session store for the lifetime of the process.
///
/// Build one at startup and share it behind an `Arc`.
pub struct SessionManager {
    store: Box<dyn SessionStore>,
    config: SessionConfig,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Builds and initializes the store named by `config`.
    pub async fn new(config: SessionConfig) -> Result<Self, SessionError> {
        let store = build_store(&config).await?;
        Ok(Self { store, config })
    }

    /// Uses `store` instead of the one `config` names.
    pub async fn with_store(
        store: impl SessionStore,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        store.init().await?;
        Ok(Self {
            store: Box::new(store),
            config,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    pub fn generate_id(&self) -> Result<String, SessionError> {
        Ok(gen_session_id()?)
    }

    /// Persists a new empty session. The caller issues its cookie.
    pub async fn start_session(&self) -> Result<SessionRecord, SessionError> {
        let id = self.generate_id()?;
        let record = self.store.start_session(&id).await?;
        tracing::debug!("Started session expiring at {}", record.expires_at);
        Ok(record)
    }

    /// Loads the session the request's cookie refers to.
    pub async fn get_session(
        &self,
        headers: &HeaderMap,
    ) -> Result<Option<SessionRecord>, SessionError> {
        match session_id_from_headers(headers, &self.config.cookie_name) {
            Some(id) => self.get_session_by_id(id).await,
            None => Ok(None),
        }
    }

    pub async fn get_session_by_id(&self, id: &str) -> Result<Option<SessionRecord>, SessionError> {
        Ok(self.store.get_session(id).await?)
    }

    pub async fn set_value(&self, id: &str, key: &str, value: Value) -> Result<bool, SessionError> {
        Ok(self.store.set_value(id, key, value).await?)
    }

    pub async fn get_value(&self, id: &str, key: &str) -> Result<Option<Value>, SessionError> {
        Ok(self.store.get_value(id, key).await?)
    }

    pub async fn remove(&self, id: &str, key: &str) -> Result<bool, SessionError> {
        Ok(self.store.remove(id, key).await?)
    }

    pub async fn update(
        &self,
        id: &str,
        mutation: Mutation,
    ) -> Result<Option<SessionRecord>, SessionError> {
        Ok(self.store.update(id, mutation).await?)
    }

    pub async fn save(&self, record: &SessionRecord) -> Result<(), SessionError> {
        Ok(self.store.save(record).await?)
    }

    pub async fn delete(&self, id: &str) -> Result<(), SessionError> {
        Ok(self.store.delete(id).await?)
    }

    pub async fn sweep_expired(&self) -> Result<usize, SessionError> {
        Ok(self.store.sweep_expired().await?)
    }

    /// `Set-Cookie` value for `record`, expiring with it.
    pub fn session_cookie(&self, record: &SessionRecord) -> Result<HeaderValue, SessionError> {
        session_cookie(&self.config, &record.id, record.expires_at)
    }

    /// `Set-Cookie` value clearing the session cookie.
    pub fn expire_cookie(&self) -> Result<HeaderValue, SessionError> {
        expired_cookie(&self.config)
    }

    /// Binds the request to its session, starting a fresh one with a pending
    /// cookie when the referenced session is missing or expired.
    pub async fn resolve(
        self: &Arc<Self>,
        headers: &HeaderMap,
    ) -> Result<SessionHandle, SessionError> {
        if let Some(record) = self.get_session(headers).await? {
            return Ok(SessionHandle::new(Arc::clone(self), record, None));
        }

        let record = self.start_session().await?;
        let cookie = self.session_cookie(&record)?;
        Ok(SessionHandle::new(Arc::clone(self), record, Some(cookie)))
    }

    /// Runs [`SessionManager::sweep_expired`] every `interval` until the task is aborted.
    pub fn spawn_expiry_sweep(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match manager.sweep_expired().await {
                    Ok(0) => tracing::trace!("Expiry sweep found nothing to remove"),
                    Ok(removed) => tracing::info!("Expiry sweep removed {} sessions", removed),
                    Err(e) => tracing::error!("Expiry sweep failed: {}", e),
                }
            }
        })
    }
}
