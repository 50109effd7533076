use std::fmt;

use axum::extract::FromRequestParts;
use http::{StatusCode, request::Parts};

use super::config::CSRF_FIELD_NAME;

/// The session's CSRF token, inserted by [`csrf_guard`](crate::csrf_guard)
/// for handlers that render forms.
#[derive(Clone, PartialEq, Eq)]
pub struct CsrfToken(String);

impl CsrfToken {
    pub(crate) fn new(token: String) -> Self {
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hidden form field submitting the token back to the guard.
    pub fn hidden_input(&self) -> String {
        format!(
            r#"<input type="hidden" name="{}" value="{}">"#,
            CSRF_FIELD_NAME.as_str(),
            self.0
        )
    }
}

// Keep the token out of logs.
impl fmt::Debug for CsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CsrfToken(..)")
    }
}

impl<S> FromRequestParts<S> for CsrfToken
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<CsrfToken>().cloned().ok_or_else(|| {
            tracing::error!("CsrfToken requested but csrf_guard is not installed");
            (StatusCode::INTERNAL_SERVER_ERROR, "CSRF guard missing")
        })
    }
}
