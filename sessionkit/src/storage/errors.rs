use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum StorageError {
    /// The backing medium could not be reached or refused the operation.
    #[error("Storage backend unavailable: {0}")]
    Backend(String),

    #[error("Session codec error: {0}")]
    Codec(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl<T: std::fmt::Debug> From<ciborium::ser::Error<T>> for StorageError {
    fn from(err: ciborium::ser::Error<T>) -> Self {
        Self::Codec(err.to_string())
    }
}

impl<T: std::fmt::Debug> From<ciborium::de::Error<T>> for StorageError {
    fn from(err: ciborium::de::Error<T>) -> Self {
        Self::Codec(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let error = StorageError::Backend("Connection refused".to_string());
        assert_eq!(
            error.to_string(),
            "Storage backend unavailable: Connection refused"
        );
    }

    #[test]
    fn test_from_redis_error() {
        let redis_error =
            redis::RedisError::from((redis::ErrorKind::IoError, "Connection refused"));

        match StorageError::from(redis_error) {
            StorageError::Backend(msg) => assert!(msg.contains("Connection refused")),
            other => panic!("Expected Backend variant, got {other:?}"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");

        match StorageError::from(io_error) {
            StorageError::Backend(msg) => assert!(msg.contains("read-only")),
            other => panic!("Expected Backend variant, got {other:?}"),
        }
    }

    #[test]
    fn test_from_decode_error() {
        let garbage: &[u8] = &[0xff, 0x00, 0x13];
        let err = ciborium::from_reader::<ciborium::Value, _>(garbage).unwrap_err();

        assert!(matches!(StorageError::from(err), StorageError::Codec(_)));
    }

    #[test]
    fn test_error_is_sync_and_send() {
        fn assert_sync_send<T: Sync + Send>() {}
        assert_sync_send::<StorageError>();
    }
}
