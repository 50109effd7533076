use crate::config::{SessionConfig, StoreKind};
use crate::storage::errors::StorageError;

use super::file::FileSessionStore;
use super::memory::MemorySessionStore;
use super::redis::RedisSessionStore;
use super::types::SessionStore;

/// Builds and initializes the store selected by `config`.
///
/// An unreachable backend fails here rather than on the first request.
pub(crate) async fn build_store(
    config: &SessionConfig,
) -> Result<Box<dyn SessionStore>, StorageError> {
    let store: Box<dyn SessionStore> = match &config.store {
        StoreKind::File { dir } => {
            tracing::info!("Initializing file session store in {}", dir.display());
            Box::new(FileSessionStore::new(dir.clone(), config.length))
        }
        StoreKind::Redis(redis) => {
            let url = redis
                .url()
                .map_err(|e| StorageError::InvalidInput(e.to_string()))?;
            tracing::info!(
                "Initializing redis session store at {}:{}/{}",
                redis.host,
                redis.port,
                redis.db
            );
            Box::new(RedisSessionStore::open(&url, config.length)?)
        }
        StoreKind::Memory => {
            tracing::info!("Initializing in-memory session store");
            Box::new(MemorySessionStore::new(config.length))
        }
    };

    if let Err(e) = store.init().await {
        tracing::error!("Failed to initialize session store: {}", e);
        return Err(e);
    }

    Ok(store)
}
