use std::ops::Deref;

use axum::extract::FromRequestParts;
use http::{StatusCode, request::Parts};
use sessionkit::SessionHandle;

/// Extractor for the request's session, placed there by
/// [`session_layer`](crate::session_layer).
///
/// ```no_run
/// use sessionkit_axum::Session;
///
/// async fn visits(session: Session) -> String {
///     let count: u32 = session.get("visits").await.ok().flatten().unwrap_or(0);
///     let _ = session.set("visits", &(count + 1)).await;
///     format!("visit #{}", count + 1)
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Session(pub SessionHandle);

impl Deref for Session {
    type Target = SessionHandle;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionHandle>()
            .cloned()
            .map(Session)
            .ok_or_else(|| {
                tracing::error!("Session requested but session_layer is not installed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Session layer missing")
            })
    }
}
