//! Shared helpers for the crate's tests: an app wired with both layers over
//! an in-memory store.

use std::sync::Arc;

use axum::{
    Form, Router,
    body::{Body, to_bytes},
    extract::Multipart,
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{self, post},
};
use http::{HeaderMap, Request, StatusCode, header::SET_COOKIE};
use serde::Deserialize;
use sessionkit::{MemorySessionStore, SessionConfig, SessionManager, StoreKind};

use crate::{CsrfToken, IntoResponseError, Session, csrf_guard, session_layer};

pub(crate) async fn memory_manager() -> Arc<SessionManager> {
    let config = SessionConfig {
        store: StoreKind::Memory,
        ..SessionConfig::default()
    };
    let store = MemorySessionStore::new(config.length);
    Arc::new(
        SessionManager::with_store(store, config)
            .await
            .expect("memory store initializes"),
    )
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
}

async fn form_page(token: CsrfToken) -> String {
    format!("<form>{}</form>", token.hidden_input())
}

async fn submit(session: Session) -> Result<&'static str, (StatusCode, String)> {
    session.set("submitted", &true).await.into_response_error()?;
    Ok("submitted")
}

async fn login(
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response, (StatusCode, String)> {
    session.regenerate(true).await.into_response_error()?;
    session
        .set("username", &form.username)
        .await
        .into_response_error()?;
    Ok((StatusCode::SEE_OTHER, [("location", "/")]).into_response())
}

/// Stores the multipart `note` field, proving the body survived the guard.
async fn upload(
    session: Session,
    mut multipart: Multipart,
) -> Result<&'static str, (StatusCode, String)> {
    while let Some(part) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        if part.name() == Some("note") {
            let note = part
                .text()
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
            session.set("note", &note).await.into_response_error()?;
        }
    }
    Ok("uploaded")
}

async fn logout(session: Session) -> Result<&'static str, (StatusCode, String)> {
    session.regenerate_new().await.into_response_error()?;
    Ok("bye")
}

pub(crate) fn app(manager: Arc<SessionManager>) -> Router {
    Router::new()
        .route("/", routing::get(form_page))
        .route("/submit", post(submit).put(submit).delete(submit))
        .route("/login", post(login))
        .route("/upload", post(upload))
        .route("/logout", post(logout))
        .layer(from_fn(csrf_guard))
        .layer(from_fn_with_state(manager, session_layer))
}

/// `name=value` of the response's session cookie.
pub(crate) fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("session_id="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

pub(crate) fn session_id(cookie: &str) -> &str {
    cookie.trim_start_matches("session_id=")
}

pub(crate) fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub(crate) fn post_form(uri: &str, cookie: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("cookie", cookie)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub(crate) const MULTIPART_BOUNDARY: &str = "sessionkit-boundary";

pub(crate) fn post_multipart(
    uri: &str,
    cookie: &str,
    fields: &[(&str, &str)],
) -> Request<Body> {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!("--{MULTIPART_BOUNDARY}\r\n"));
        body.push_str(&format!(
            "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!("--{MULTIPART_BOUNDARY}--\r\n"));
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("cookie", cookie)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub(crate) async fn body_string(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
