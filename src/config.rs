//! Process configuration read from the environment (and an optional `.env`).

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{info, warn};

use crate::bus::DEFAULT_SESSION_QUEUE;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub session_queue: usize,
    pub token_ttl_hours: i64,
    pub allow_admin_signup: bool,
    pub cors_origin: Option<String>,
}

impl Config {
    pub fn load() -> Self {
        if let Err(e) = dotenvy::dotenv() {
            info!("no .env file loaded: {e}");
        }

        Self {
            host: try_load("RESOLVEDESK_HOST", "0.0.0.0".to_string()),
            port: try_load("RESOLVEDESK_PORT", 5000),
            data_dir: resolvedesk_data_dir(),
            session_queue: try_load("RESOLVEDESK_SESSION_QUEUE", DEFAULT_SESSION_QUEUE),
            token_ttl_hours: try_load("RESOLVEDESK_TOKEN_TTL_HOURS", 24),
            allow_admin_signup: try_load("RESOLVEDESK_ALLOW_ADMIN_SIGNUP", false),
            cors_origin: var("RESOLVEDESK_CORS_ORIGIN"),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("resolvedesk.db")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            data_dir: PathBuf::from(".resolvedesk"),
            session_queue: DEFAULT_SESSION_QUEUE,
            token_ttl_hours: 24,
            allow_admin_signup: false,
            cors_origin: None,
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(raw) = var(key) else {
        info!("{key} not set, using default: {default}");
        return default;
    };

    raw.parse().unwrap_or_else(|e| {
        warn!("invalid {key} value '{raw}': {e}, using default: {default}");
        default
    })
}

fn resolvedesk_data_dir() -> PathBuf {
    if let Some(path) = var("RESOLVEDESK_DATA_DIR") {
        return PathBuf::from(path);
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(app_data) = env::var("APPDATA") {
            return PathBuf::from(app_data).join("ResolveDesk");
        }
    }

    if let Ok(home) = env::var("HOME") {
        return PathBuf::from(home).join(".resolvedesk");
    }

    if let Ok(home) = env::var("USERPROFILE") {
        return PathBuf::from(home).join(".resolvedesk");
    }

    PathBuf::from(".resolvedesk")
}
