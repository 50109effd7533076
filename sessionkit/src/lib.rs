//! sessionkit - server-side sessions with pluggable storage
//!
//! Sessions live in a [`SessionStore`] (files, redis or memory) owned by a
//! [`SessionManager`]. Each request works through a [`SessionHandle`] that
//! reads from the record loaded on arrival and writes through to the store,
//! with flash, old-input and field-error namespaces and a per-session CSRF
//! token.

mod config;
mod session;
mod storage;
mod utils;

#[cfg(test)]
mod test_utils;

use std::sync::Arc;

use tokio::sync::OnceCell;

pub use config::{RedisConfig, SessionConfig, StoreKind};

pub use session::{CSRF_SESSION_KEY, SessionError, SessionHandle, SessionManager, verify_csrf_token};

pub use storage::{
    FileSessionStore, MemorySessionStore, Mutation, RedisSessionStore, SessionRecord,
    SessionStore, StorageError, Value, from_value, to_value,
};

pub use utils::{gen_session_id, is_valid_session_id};

static SESSION_MANAGER: OnceCell<Arc<SessionManager>> = OnceCell::const_new();

/// Initialize the process-wide session manager.
///
/// The first call builds the store from `config`; later calls return the same
/// manager and ignore their argument.
pub async fn init(config: SessionConfig) -> Result<Arc<SessionManager>, SessionError> {
    SESSION_MANAGER
        .get_or_try_init(|| async {
            let manager = SessionManager::new(config).await?;
            Ok::<_, SessionError>(Arc::new(manager))
        })
        .await
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[tokio::test]
    #[serial]
    async fn test_init_builds_the_manager_once() {
        let memory = SessionConfig {
            store: StoreKind::Memory,
            ..SessionConfig::default()
        };
        let first = init(memory.clone()).await.unwrap();
        let second = init(SessionConfig {
            cookie_name: "other".to_string(),
            ..memory
        })
        .await
        .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.config().cookie_name, "session_id");
    }
}
