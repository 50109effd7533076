use chrono::{DateTime, Utc};
use http::header::COOKIE;
use http::{HeaderMap, HeaderValue};

use crate::config::SessionConfig;
use crate::session::errors::SessionError;

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

fn cookie_attributes(config: &SessionConfig) -> &'static str {
    if config.production {
        "HttpOnly; SameSite=Strict; Secure"
    } else {
        "HttpOnly; SameSite=Lax"
    }
}

/// `Set-Cookie` value carrying `id` until `expires_at`.
#[tracing::instrument(skip_all, fields(cookie = %config.cookie_name, expires_at = %expires_at))]
pub(crate) fn session_cookie(
    config: &SessionConfig,
    id: &str,
    expires_at: DateTime<Utc>,
) -> Result<HeaderValue, SessionError> {
    let max_age = (expires_at - Utc::now()).num_seconds().max(0);
    let cookie = format!(
        "{}={}; Path=/; Expires={}; Max-Age={}; {}",
        config.cookie_name,
        id,
        expires_at.format(HTTP_DATE_FORMAT),
        max_age,
        cookie_attributes(config)
    );
    tracing::debug!("Issuing session cookie");

    HeaderValue::from_str(&cookie)
        .map_err(|_| SessionError::Cookie("Invalid session cookie value".to_string()))
}

/// `Set-Cookie` value that makes the browser drop the session cookie.
pub(crate) fn expired_cookie(config: &SessionConfig) -> Result<HeaderValue, SessionError> {
    let cookie = format!(
        "{}=; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0; {}",
        config.cookie_name,
        cookie_attributes(config)
    );
    HeaderValue::from_str(&cookie)
        .map_err(|_| SessionError::Cookie("Invalid cookie name".to_string()))
}

/// Finds the session id among the request's `Cookie` headers.
///
/// An unreadable header is skipped: a visitor with a broken cookie jar is
/// simply anonymous.
pub(crate) fn session_id_from_headers<'a>(
    headers: &'a HeaderMap,
    cookie_name: &str,
) -> Option<&'a str> {
    let session_id = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| match value.to_str() {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::debug!("Skipping unreadable cookie header: {}", e);
                None
            }
        })
        .flat_map(|s| s.split(';'))
        .map(str::trim)
        .find_map(|pair| match pair.split_once('=') {
            Some((k, v)) if k == cookie_name && !v.is_empty() => Some(v),
            _ => None,
        });

    if session_id.is_none() {
        tracing::debug!("No session cookie '{}' found in cookies", cookie_name);
    }

    session_id
}
