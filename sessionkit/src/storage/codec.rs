//! Binary encoding of [`SessionRecord`]s for the file and redis stores.

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::errors::StorageError;
use super::types::{SessionRecord, Value};

pub(crate) fn encode_record(record: &SessionRecord) -> Result<Vec<u8>, StorageError> {
    let mut buf = Vec::new();
    ciborium::into_writer(record, &mut buf)?;
    Ok(buf)
}

pub(crate) fn decode_record(bytes: &[u8]) -> Result<SessionRecord, StorageError> {
    Ok(ciborium::from_reader(bytes)?)
}

/// Converts any serde value into the dynamic form held in a record.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, StorageError> {
    Value::serialized(value).map_err(|e| StorageError::Codec(format!("{e:?}")))
}

/// Converts a stored value back to the caller's type.
pub fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T, StorageError> {
    value
        .deserialized()
        .map_err(|e| StorageError::Codec(format!("{e:?}")))
}
