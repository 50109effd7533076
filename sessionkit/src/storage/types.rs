use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub use ciborium::Value;

/// One visitor's server-side state.
///
/// The record is a plain value: persistence is the store's business and
/// request-scoped mutation is the handle's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    #[serde(default)]
    pub values: HashMap<String, Value>,
    /// Messages delivered once, on the next rendered response.
    #[serde(default)]
    pub flash: HashMap<String, Value>,
    /// Submitted form input kept for repopulation after a redirect.
    #[serde(default)]
    pub old_input: HashMap<String, Value>,
    /// Validation messages keyed by form field.
    #[serde(default)]
    pub field_errors: HashMap<String, Vec<String>>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(id: impl Into<String>, window: Duration) -> Self {
        Self {
            id: id.into(),
            values: HashMap::new(),
            flash: HashMap::new(),
            old_input: HashMap::new(),
            field_errors: HashMap::new(),
            expires_at: Utc::now() + window,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Slides the expiry forward to `now + window`.
    pub fn touch(&mut self, window: Duration) {
        self.expires_at = Utc::now() + window;
    }

    /// Copies every value and ephemeral entry into a fresh record under `id`.
    pub(crate) fn carry_over(&self, id: impl Into<String>, window: Duration) -> Self {
        Self {
            id: id.into(),
            values: self.values.clone(),
            flash: self.flash.clone(),
            old_input: self.old_input.clone(),
            field_errors: self.field_errors.clone(),
            expires_at: Utc::now() + window,
        }
    }
}
