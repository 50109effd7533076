//! One-time message namespaces: flash notices, old form input and field errors.
//!
//! `get_*` accessors consume what they return; `peek_*` accessors leave it in
//! place for a later request.

use std::collections::HashMap;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::session::errors::SessionError;
use crate::storage::{SessionRecord, Value, from_value, to_value};

use super::handle::{Namespace, SessionHandle};

fn flash(record: &mut SessionRecord) -> &mut HashMap<String, Value> {
    &mut record.flash
}

fn old_input(record: &mut SessionRecord) -> &mut HashMap<String, Value> {
    &mut record.old_input
}

fn field_errors(record: &mut SessionRecord) -> &mut HashMap<String, Vec<String>> {
    &mut record.field_errors
}

fn decode<T: DeserializeOwned>(value: Option<Value>) -> Result<Option<T>, SessionError> {
    Ok(value.map(|v| from_value(&v)).transpose()?)
}

impl SessionHandle {
    async fn insert_entry<V: Clone + Send + Sync + 'static>(
        &self,
        ns: Namespace<V>,
        key: &str,
        value: V,
    ) -> Result<(), SessionError> {
        let key = key.to_string();
        self.apply(std::sync::Arc::new(move |record: &mut SessionRecord| {
            ns(record).insert(key.clone(), value.clone());
        }))
        .await
    }

    async fn clear<V: Send + Sync + 'static>(&self, ns: Namespace<V>) -> Result<(), SessionError> {
        let mut state = self.lock().await;
        self.clear_locked(&mut state, ns).await
    }

    pub async fn set_flash<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), SessionError> {
        self.insert_entry(flash, key, to_value(value)?).await
    }

    pub async fn get_flash<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, SessionError> {
        decode(self.take_entry(flash, key).await?)
    }

    pub async fn peek_flash<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, SessionError> {
        decode(self.peek_entry(flash, key).await)
    }

    /// Every flash entry, consumed. Call once per rendered response.
    pub async fn get_all_flash(&self) -> Result<HashMap<String, Value>, SessionError> {
        self.take_entries(flash).await
    }

    pub async fn peek_all_flash(&self) -> HashMap<String, Value> {
        self.peek_entries(flash).await
    }

    pub async fn clear_flash(&self) -> Result<(), SessionError> {
        self.clear(flash).await
    }

    pub async fn set_old_input<T: Serialize + ?Sized>(
        &self,
        field: &str,
        value: &T,
    ) -> Result<(), SessionError> {
        self.insert_entry(old_input, field, to_value(value)?).await
    }

    pub async fn get_old_input<T: DeserializeOwned>(
        &self,
        field: &str,
    ) -> Result<Option<T>, SessionError> {
        decode(self.take_entry(old_input, field).await?)
    }

    pub async fn peek_old_input<T: DeserializeOwned>(
        &self,
        field: &str,
    ) -> Result<Option<T>, SessionError> {
        decode(self.peek_entry(old_input, field).await)
    }

    pub async fn get_all_old_input(&self) -> Result<HashMap<String, Value>, SessionError> {
        self.take_entries(old_input).await
    }

    pub async fn peek_all_old_input(&self) -> HashMap<String, Value> {
        self.peek_entries(old_input).await
    }

    pub async fn clear_old_input(&self) -> Result<(), SessionError> {
        self.clear(old_input).await
    }

    /// Replaces the messages for `field` with a single one.
    pub async fn set_field_error(&self, field: &str, message: &str) -> Result<(), SessionError> {
        self.insert_entry(field_errors, field, vec![message.to_string()])
            .await
    }

    pub async fn set_field_errors(
        &self,
        field: &str,
        messages: Vec<String>,
    ) -> Result<(), SessionError> {
        self.insert_entry(field_errors, field, messages).await
    }

    /// Appends a message after any already recorded for `field`.
    pub async fn add_field_error(&self, field: &str, message: &str) -> Result<(), SessionError> {
        let field = field.to_string();
        let message = message.to_string();
        self.apply(std::sync::Arc::new(move |record: &mut SessionRecord| {
            record
                .field_errors
                .entry(field.clone())
                .or_default()
                .push(message.clone());
        }))
        .await
    }

    /// First message for `field`; consumes all of them.
    pub async fn get_field_error(&self, field: &str) -> Result<Option<String>, SessionError> {
        Ok(self
            .take_entry(field_errors, field)
            .await?
            .and_then(|messages| messages.into_iter().next()))
    }

    pub async fn get_field_errors(&self, field: &str) -> Result<Vec<String>, SessionError> {
        Ok(self
            .take_entry(field_errors, field)
            .await?
            .unwrap_or_default())
    }

    pub async fn peek_field_error(&self, field: &str) -> Option<String> {
        self.peek_entry(field_errors, field)
            .await
            .and_then(|messages| messages.into_iter().next())
    }

    pub async fn peek_field_errors(&self, field: &str) -> Vec<String> {
        self.peek_entry(field_errors, field)
            .await
            .unwrap_or_default()
    }

    pub async fn get_all_field_errors(&self) -> Result<HashMap<String, Vec<String>>, SessionError> {
        self.take_entries(field_errors).await
    }

    pub async fn peek_all_field_errors(&self) -> HashMap<String, Vec<String>> {
        self.peek_entries(field_errors).await
    }

    pub async fn clear_field_errors(&self) -> Result<(), SessionError> {
        self.clear(field_errors).await
    }
}
