use subtle::ConstantTimeEq;

use crate::session::errors::SessionError;
use crate::utils::{TOKEN_BYTES, gen_random_string};

/// Reserved key holding the anti-forgery token inside a record's values.
pub const CSRF_SESSION_KEY: &str = "csrf_token";

pub(crate) fn gen_csrf_token() -> Result<String, SessionError> {
    Ok(gen_random_string(TOKEN_BYTES)?)
}

/// Constant-time comparison of the session's token with the one a request supplied.
pub fn verify_csrf_token(expected: &str, supplied: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    expected.as_bytes().ct_eq(supplied.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gen_csrf_token_shape() {
        let token = gen_csrf_token().unwrap();
        assert_eq!(token.len(), 43);
        assert_ne!(token, gen_csrf_token().unwrap());
    }

    #[test]
    fn test_verify_csrf_token() {
        let token = gen_csrf_token().unwrap();
        assert!(verify_csrf_token(&token, &token.clone()));
        assert!(!verify_csrf_token(&token, "forged"));
        assert!(!verify_csrf_token(&token, ""));
        assert!(!verify_csrf_token(&token, &token[..token.len() - 1]));
    }

    #[test]
    fn test_empty_expected_token_never_matches() {
        assert!(!verify_csrf_token("", ""));
    }
}
