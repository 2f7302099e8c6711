use std::env;
use std::str::FromStr;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Mongo,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StorageBackend::Mongo),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(AppError::Config(format!("unknown STORAGE_BACKEND `{other}`"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Full chat-completions URL. `None` keeps the relay in local echo mode.
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub require_login: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        ChatConfig {
            api_url: None,
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 15,
            require_login: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub backend: StorageBackend,
    pub database_url: String,
    pub database_name: String,
    pub mongo_transactions: bool,
    pub jwt_secret: String,
    pub session_ttl_hours: i64,
    pub cookie_secure: bool,
    pub catalog_seed: Option<String>,
    pub seed_price_range: (u32, u32),
    pub chat: ChatConfig,
}

impl AppConfig {
    /// Reads the configuration from the process environment (after `.env`).
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = var("JWT_SECRET")
            .ok_or_else(|| AppError::Config("JWT_SECRET must be set".into()))?;

        let seed_price_range = (
            parse(&or("SEED_PRICE_MIN", "100"), "SEED_PRICE_MIN")?,
            parse(&or("SEED_PRICE_MAX", "1000"), "SEED_PRICE_MAX")?,
        );
        if seed_price_range.0 > seed_price_range.1 {
            return Err(AppError::Config("SEED_PRICE_MIN exceeds SEED_PRICE_MAX".into()));
        }

        let chat = ChatConfig {
            api_url: var("CHAT_API_URL"),
            api_key: var("CHAT_API_KEY"),
            model: or("CHAT_MODEL", "gpt-4o-mini"),
            timeout_secs: parse(&or("CHAT_TIMEOUT_SECS", "15"), "CHAT_TIMEOUT_SECS")?,
            require_login: parse_bool(&or("CHAT_REQUIRE_LOGIN", "true"), "CHAT_REQUIRE_LOGIN")?,
        };

        Ok(AppConfig {
            bind_addr: or("BIND_ADDR", "127.0.0.1:3000"),
            backend: or("STORAGE_BACKEND", "mongo").parse()?,
            database_url: or("DATABASE_URL", "mongodb://localhost:27017"),
            database_name: or("DATABASE_NAME", "bookgenie_db"),
            mongo_transactions: parse_bool(&or("MONGO_TRANSACTIONS", "true"), "MONGO_TRANSACTIONS")?,
            jwt_secret,
            session_ttl_hours: parse(&or("SESSION_TTL_HOURS", "24"), "SESSION_TTL_HOURS")?,
            cookie_secure: parse_bool(&or("COOKIE_SECURE", "false"), "COOKIE_SECURE")?,
            catalog_seed: var("CATALOG_SEED"),
            seed_price_range,
            chat,
        })
    }
}

fn parse<T: FromStr>(raw: &str, key: &str) -> Result<T, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::Config(format!("{key} has an invalid value `{raw}`")))
}

fn parse_bool(raw: &str, key: &str) -> Result<bool, AppError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::Config(format!("{key} must be a boolean, got `{raw}`"))),
    }
}
