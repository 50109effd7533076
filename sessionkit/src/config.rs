//! Session configuration, read from the environment once at manager construction.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::Duration;

use crate::session::SessionError;

pub const SESSION_LENGTH_DEFAULT: i64 = 60;
pub const SESSION_NAME_DEFAULT: &str = "session_id";
pub const SESSION_FILE_PATH_DEFAULT: &str = "tmp/sessions";
pub const SESSION_SWEEP_INTERVAL_DEFAULT: u64 = 300;

pub const REDIS_HOST_DEFAULT: &str = "localhost";
pub const REDIS_PORT_DEFAULT: u16 = 6379;
pub const REDIS_DB_DEFAULT: i64 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: REDIS_HOST_DEFAULT.to_string(),
            port: REDIS_PORT_DEFAULT,
            db: REDIS_DB_DEFAULT,
            password: None,
        }
    }
}

impl RedisConfig {
    /// Connection URL with the password percent-encoded.
    pub fn url(&self) -> Result<String, SessionError> {
        let mut url = url::Url::parse(&format!("redis://{}:{}/{}", self.host, self.port, self.db))
            .map_err(|e| SessionError::Config(format!("Invalid redis address: {e}")))?;
        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            url.set_password(Some(password))
                .map_err(|_| SessionError::Config("Invalid redis password".to_string()))?;
        }
        Ok(url.to_string())
    }
}

/// Which backend holds the session records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKind {
    File { dir: PathBuf },
    Redis(RedisConfig),
    Memory,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub store: StoreKind,
    /// Sliding expiration window.
    pub length: Duration,
    /// Cookie carrying the session id.
    pub cookie_name: String,
    /// Production switches the cookie to `Secure` and `SameSite=Strict`.
    pub production: bool,
    pub sweep_interval: std::time::Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store: StoreKind::File {
                dir: PathBuf::from(SESSION_FILE_PATH_DEFAULT),
            },
            length: Duration::minutes(SESSION_LENGTH_DEFAULT),
            cookie_name: SESSION_NAME_DEFAULT.to_string(),
            production: false,
            sweep_interval: std::time::Duration::from_secs(SESSION_SWEEP_INTERVAL_DEFAULT),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring unparsable {}={:?}", key, raw);
            default
        }),
        _ => default,
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl SessionConfig {
    pub fn from_env() -> Result<Self, SessionError> {
        let store = match env_string("SESSION_STORE", "file").to_lowercase().as_str() {
            "file" => StoreKind::File {
                dir: PathBuf::from(env_string("SESSION_FILE_PATH", SESSION_FILE_PATH_DEFAULT)),
            },
            "redis" => StoreKind::Redis(RedisConfig {
                host: env_string("SESSION_REDIS_HOST", REDIS_HOST_DEFAULT),
                port: env_or("SESSION_REDIS_PORT", REDIS_PORT_DEFAULT),
                db: env_or("SESSION_REDIS_DB", REDIS_DB_DEFAULT),
                password: env::var("SESSION_REDIS_PASSWORD")
                    .ok()
                    .filter(|p| !p.is_empty()),
            }),
            "memory" => StoreKind::Memory,
            other => {
                return Err(SessionError::Config(format!(
                    "Unsupported session store type: {other}. Supported types are 'file', 'redis' and 'memory'"
                )));
            }
        };

        let minutes = env_or("SESSION_LENGTH", SESSION_LENGTH_DEFAULT);
        let minutes = if minutes > 0 {
            minutes
        } else {
            SESSION_LENGTH_DEFAULT
        };

        Ok(Self {
            store,
            length: Duration::minutes(minutes),
            cookie_name: env_string("SESSION_NAME", SESSION_NAME_DEFAULT),
            production: env_string("APP_ENV", "development").eq_ignore_ascii_case("production"),
            sweep_interval: std::time::Duration::from_secs(
                env_or("SESSION_SWEEP_INTERVAL", SESSION_SWEEP_INTERVAL_DEFAULT).max(1),
            ),
        })
    }
}
