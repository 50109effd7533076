use axum::response::{IntoResponse, Response};
use http::StatusCode;
use sessionkit::SessionError;

/// Helper trait for converting errors to a standard response error format
pub trait IntoResponseError<T> {
    fn into_response_error(self) -> Result<T, (StatusCode, String)>;
}

pub(crate) fn status_for(err: &SessionError) -> StatusCode {
    match err {
        SessionError::CsrfToken(_) => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl<T> IntoResponseError<T> for Result<T, SessionError> {
    fn into_response_error(self) -> Result<T, (StatusCode, String)> {
        self.map_err(|e| {
            let status = status_for(&e);
            if status.is_server_error() {
                tracing::error!("Session failure: {}", e);
            }
            (status, e.to_string())
        })
    }
}

/// Response for a failure at the middleware boundary. Server errors are
/// logged and answered without detail.
pub(crate) fn session_error_response(err: SessionError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!("Session failure: {}", err);
        (status, "Session unavailable").into_response()
    } else {
        tracing::debug!("Request rejected: {}", err);
        (status, err.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csrf_error_is_forbidden() {
        let result: Result<(), SessionError> =
            Err(SessionError::CsrfToken("mismatch".to_string()));

        let Err((status, message)) = result.into_response_error() else {
            panic!("expected an error");
        };
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(message, "CSRF token error: mismatch");
    }

    #[test]
    fn test_storage_error_is_internal() {
        let result: Result<(), SessionError> =
            Err(SessionError::Storage("disk full".to_string()));

        let response_error = result.into_response_error();
        assert!(matches!(
            response_error,
            Err((StatusCode::INTERNAL_SERVER_ERROR, _))
        ));
    }

    #[test]
    fn test_success_case() {
        let result: Result<String, SessionError> = Ok("Success".to_string());
        assert_eq!(result.into_response_error().unwrap(), "Success");
    }

    #[test]
    fn test_session_error_response_hides_backend_detail() {
        let response =
            session_error_response(SessionError::Storage("redis://secret@host".to_string()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
