//! Settings of the axum adapter, read from the environment on first use.

use std::sync::LazyLock;

/// Form field carrying the CSRF token in urlencoded submissions.
/// Default: "csrf_token"
pub static CSRF_FIELD_NAME: LazyLock<String> = LazyLock::new(|| {
    std::env::var("CSRF_FIELD_NAME")
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "csrf_token".to_string())
});

pub static SESSIONKIT_RESPOND_WITH_X_CSRF_TOKEN: LazyLock<bool> = LazyLock::new(|| {
    std::env::var("SESSIONKIT_RESPOND_WITH_X_CSRF_TOKEN")
        .map(|val| val.to_lowercase() != "false")
        .unwrap_or(true)
});

/// Largest form body the CSRF guard buffers to look for the token.
pub const CSRF_FORM_BODY_LIMIT: usize = 1024 * 1024;
