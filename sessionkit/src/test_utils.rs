//! Shared helpers for the crate's tests.

use std::sync::Arc;

use http::header::COOKIE;
use http::{HeaderMap, HeaderValue};

use crate::config::{SessionConfig, StoreKind};
use crate::session::SessionManager;
use crate::storage::MemorySessionStore;

/// A manager over a fresh in-memory store with the default 60 minute window.
pub(crate) async fn memory_manager() -> Arc<SessionManager> {
    let config = SessionConfig {
        store: StoreKind::Memory,
        ..SessionConfig::default()
    };
    let store = MemorySessionStore::new(config.length);
    let manager = SessionManager::with_store(store, config)
        .await
        .expect("memory store never fails to initialize");
    Arc::new(manager)
}

/// Request headers presenting `id` in the manager's session cookie.
pub(crate) fn request_with_session(manager: &SessionManager, id: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let cookie = format!("{}={}", manager.config().cookie_name, id);
    headers.insert(
        COOKIE,
        HeaderValue::from_str(&cookie).expect("session ids are header safe"),
    );
    headers
}
