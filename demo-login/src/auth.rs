use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Session key of the signed-in user.
pub(crate) const AUTH_KEY: &str = "auth";

/// What the session remembers about a signed-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AuthData {
    pub username: String,
    pub logged_in_at: DateTime<Utc>,
}

/// Credential validation, kept outside the session machinery.
pub(crate) trait CredentialChecker: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> bool;
}

/// A single fixed account, good enough to exercise the login flow.
pub(crate) struct DemoAccount {
    username: String,
    password: String,
}

impl DemoAccount {
    pub(crate) fn from_env() -> Self {
        Self {
            username: std::env::var("DEMO_USERNAME").unwrap_or_else(|_| "ada".to_string()),
            password: std::env::var("DEMO_PASSWORD").unwrap_or_else(|_| "lovelace".to_string()),
        }
    }
}

impl CredentialChecker for DemoAccount {
    fn verify(&self, username: &str, password: &str) -> bool {
        let user_ok: bool = self.username.as_bytes().ct_eq(username.as_bytes()).into();
        let pass_ok: bool = self.password.as_bytes().ct_eq(password.as_bytes()).into();
        user_ok & pass_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_account_verify() {
        let account = DemoAccount {
            username: "ada".to_string(),
            password: "lovelace".to_string(),
        };
        assert!(account.verify("ada", "lovelace"));
        assert!(!account.verify("ada", "babbage"));
        assert!(!account.verify("charles", "lovelace"));
        assert!(!account.verify("", ""));
    }
}
