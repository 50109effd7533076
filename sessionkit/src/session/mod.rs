mod errors;
mod main;

pub use errors::SessionError;
pub use main::{CSRF_SESSION_KEY, SessionHandle, SessionManager, verify_csrf_token};
