use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use ring::rand::SecureRandom;
use thiserror::Error;

/// Number of random bytes behind every session id and CSRF token.
pub(crate) const TOKEN_BYTES: usize = 32;

/// Length of a [`TOKEN_BYTES`] value once URL-safe base64 encoded without padding.
pub(crate) const ENCODED_TOKEN_LEN: usize = (TOKEN_BYTES * 4).div_ceil(3);

pub(crate) fn base64url_encode(input: Vec<u8>) -> String {
    URL_SAFE_NO_PAD.encode(input)
}

pub fn gen_random_string(len: usize) -> Result<String, UtilError> {
    let rng = ring::rand::SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes)
        .map_err(|_| UtilError::Crypto("Failed to generate random string".to_string()))?;
    Ok(base64url_encode(bytes))
}

/// Generates a session id carrying 256 bits of entropy.
pub fn gen_session_id() -> Result<String, UtilError> {
    gen_random_string(TOKEN_BYTES)
}

/// Checks that `id` has the exact shape of an id produced by [`gen_session_id`].
///
/// Ids arrive from cookies and end up as redis keys and file names, so anything
/// outside the URL-safe alphabet (path separators, dots) is refused here.
pub fn is_valid_session_id(id: &str) -> bool {
    id.len() == ENCODED_TOKEN_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[derive(Debug, Error, Clone)]
pub enum UtilError {
    #[error("Crypto error: {0}")]
    Crypto(String),
}
