mod cookie;
mod csrf;
mod ephemeral;
mod handle;
mod manager;

pub use csrf::{CSRF_SESSION_KEY, verify_csrf_token};
pub use handle::SessionHandle;
pub use manager::SessionManager;
