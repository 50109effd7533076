//! Axum integration for [`sessionkit`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use axum::{Router, middleware::{from_fn, from_fn_with_state}, routing::get};
//! use sessionkit_axum::{Session, SessionConfig, SessionManager, csrf_guard, session_layer};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = Arc::new(SessionManager::new(SessionConfig::from_env()?).await?);
//! let app: Router = Router::new()
//!     .route("/", get(|_session: Session| async { "hello" }))
//!     .layer(from_fn(csrf_guard))
//!     .layer(from_fn_with_state(manager, session_layer));
//! # Ok(())
//! # }
//! ```

mod config;
mod csrf;
mod error;
mod middleware;
mod session;

#[cfg(test)]
mod test_utils;

pub use config::{CSRF_FIELD_NAME, CSRF_FORM_BODY_LIMIT, SESSIONKIT_RESPOND_WITH_X_CSRF_TOKEN};
pub use csrf::CsrfToken;
pub use error::IntoResponseError;
pub use middleware::{CSRF_HEADER, csrf_guard, session_layer};
pub use session::Session;

// Re-export the core so applications depend on one crate
pub use sessionkit::{
    SessionConfig, SessionError, SessionHandle, SessionManager, StoreKind, Value, from_value,
    init, to_value,
};
