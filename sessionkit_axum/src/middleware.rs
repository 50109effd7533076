use std::sync::Arc;

use axum::{
    body::{Body, Bytes, to_bytes},
    extract::{FromRequest, Multipart, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http::{
    Method, StatusCode,
    header::{CONTENT_TYPE, HeaderValue, SET_COOKIE},
};
use sessionkit::{SessionError, SessionHandle, SessionManager, verify_csrf_token};

use super::config::{CSRF_FIELD_NAME, CSRF_FORM_BODY_LIMIT, SESSIONKIT_RESPOND_WITH_X_CSRF_TOKEN};
use super::csrf::CsrfToken;
use super::error::session_error_response;

pub const CSRF_HEADER: &str = "X-CSRF-Token";

/// Binds every request to its session.
///
/// Install with `axum::middleware::from_fn_with_state(manager, session_layer)`.
/// The handle is available to handlers through [`Session`](crate::Session);
/// any cookie it issued is appended to the response.
pub async fn session_layer(
    State(manager): State<Arc<SessionManager>>,
    mut req: Request,
    next: Next,
) -> Response {
    let handle = match manager.resolve(req.headers()).await {
        Ok(handle) => handle,
        Err(err) => return session_error_response(err),
    };

    req.extensions_mut().insert(handle.clone());
    let mut response = next.run(req).await;

    if let Some(cookie) = handle.take_set_cookie().await {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

fn is_state_changing(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

#[derive(Clone, Copy)]
enum FormKind {
    UrlEncoded,
    Multipart,
}

fn form_kind(req: &Request) -> Option<FormKind> {
    let content_type = req.headers().get(CONTENT_TYPE)?.to_str().ok()?;
    if content_type.starts_with("application/x-www-form-urlencoded") {
        Some(FormKind::UrlEncoded)
    } else if content_type.starts_with("multipart/form-data") {
        Some(FormKind::Multipart)
    } else {
        None
    }
}

/// Finds the token field in a buffered `multipart/form-data` body. A body
/// that does not parse yields no token.
async fn multipart_token(content_type: HeaderValue, bytes: Bytes) -> Option<String> {
    let req = Request::builder()
        .header(CONTENT_TYPE, content_type)
        .body(Body::from(bytes))
        .ok()?;
    let mut multipart = Multipart::from_request(req, &()).await.ok()?;
    let field = CSRF_FIELD_NAME.as_str();
    while let Ok(Some(part)) = multipart.next_field().await {
        if part.name() == Some(field) {
            return part.text().await.ok();
        }
    }
    None
}

// Helper function to add CSRF token to response
fn add_csrf_header(mut response: Response, csrf_token: &str) -> Response {
    if !*SESSIONKIT_RESPOND_WITH_X_CSRF_TOKEN {
        return response;
    }

    if let Ok(header_value) = HeaderValue::from_str(csrf_token) {
        response.headers_mut().insert(CSRF_HEADER, header_value);
    } else {
        tracing::error!("Failed to create CSRF header value from token");
    }
    response
}

/// Token the client supplied: the `X-CSRF-Token` header, else the form field
/// of an urlencoded or multipart body. The body is buffered and handed back
/// intact.
async fn supplied_token(req: Request) -> Result<(Option<String>, Request), Response> {
    if let Some(token) = req
        .headers()
        .get(CSRF_HEADER)
        .and_then(|h| h.to_str().ok())
    {
        let token = token.to_string();
        return Ok((Some(token), req));
    }

    let Some(kind) = form_kind(&req) else {
        return Ok((None, req));
    };

    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, CSRF_FORM_BODY_LIMIT).await.map_err(|e| {
        tracing::warn!("Failed to buffer form body for CSRF check: {}", e);
        (StatusCode::PAYLOAD_TOO_LARGE, "Form body too large").into_response()
    })?;

    let token = match kind {
        FormKind::UrlEncoded => {
            let field = CSRF_FIELD_NAME.as_str();
            url::form_urlencoded::parse(&bytes)
                .find(|(name, _)| name == field)
                .map(|(_, value)| value.into_owned())
        }
        FormKind::Multipart => match parts.headers.get(CONTENT_TYPE) {
            Some(content_type) => multipart_token(content_type.clone(), bytes.clone()).await,
            None => None,
        },
    };

    Ok((token, Request::from_parts(parts, Body::from(bytes))))
}

/// Rejects state-changing requests whose CSRF token does not match the
/// session's, before any handler runs.
///
/// The token is read from the `X-CSRF-Token` header, else from the form
/// field of an urlencoded or multipart body of at most
/// [`CSRF_FORM_BODY_LIMIT`](crate::CSRF_FORM_BODY_LIMIT) bytes.
///
/// Must sit inside [`session_layer`]. Other requests get a token minted if
/// the session holds none. Handlers can extract the current [`CsrfToken`].
pub async fn csrf_guard(mut req: Request, next: Next) -> Response {
    let Some(session) = req.extensions().get::<SessionHandle>().cloned() else {
        tracing::error!("csrf_guard installed without session_layer");
        return session_error_response(SessionError::Config(
            "csrf_guard requires session_layer".to_string(),
        ));
    };

    let token = if is_state_changing(req.method()) {
        // Verification never mints: a rejected request leaves the session untouched.
        let Some(expected) = session.peek_csrf().await else {
            return session_error_response(SessionError::CsrfToken(
                "No CSRF token issued for this session".to_string(),
            ));
        };

        let (supplied, verified_req) = match supplied_token(req).await {
            Ok(found) => found,
            Err(response) => return response,
        };
        match supplied {
            Some(supplied) if verify_csrf_token(&expected, &supplied) => {
                tracing::trace!("CSRF token verified");
            }
            Some(_) => {
                tracing::warn!("CSRF token mismatch on {}", verified_req.uri().path());
                return session_error_response(SessionError::CsrfToken(
                    "CSRF token mismatch".to_string(),
                ));
            }
            None => {
                tracing::warn!("CSRF token missing on {}", verified_req.uri().path());
                return session_error_response(SessionError::CsrfToken(
                    "CSRF token missing".to_string(),
                ));
            }
        }
        req = verified_req;
        expected
    } else {
        match session.get_csrf().await {
            Ok(token) => token,
            Err(err) => return session_error_response(err),
        }
    };

    req.extensions_mut().insert(CsrfToken::new(token.clone()));
    let response = next.run(req).await;

    // The handler may have rotated the token.
    let current = session.peek_csrf().await.unwrap_or(token);
    add_csrf_header(response, &current)
}
