/*
 * Responsibility
 * - Load settings from the environment (.env is honoured via dotenvy)
 * - Validate values; a missing required key fails startup
 * - Keep parsing independent of the process env (`from_lookup`) so it can be tested
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(raw: Option<String>) -> Self {
        match raw
            .unwrap_or_else(|| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub log_format: LogFormat,

    pub valkey_url: String,
    pub session_cookie_name: String,
    pub session_key_prefix: String,

    pub request_timeout: Duration,
    pub request_body_limit_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port: u16 = match lookup("PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid("PORT"))?,
            None => 3000,
        };

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::parse(lookup("APP_ENV"));

        // Production defaults to JSON lines; LOG_FORMAT overrides either way.
        let log_format = match lookup("LOG_FORMAT").map(|v| v.to_ascii_lowercase()) {
            Some(v) if v == "json" => LogFormat::Json,
            Some(v) if v == "text" => LogFormat::Text,
            Some(_) => return Err(ConfigError::Invalid("LOG_FORMAT")),
            None if app_env.is_production() => LogFormat::Json,
            None => LogFormat::Text,
        };

        let valkey_url = lookup("VALKEY_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("VALKEY_URL"))?;

        let session_cookie_name =
            lookup("SESSION_COOKIE_NAME").unwrap_or_else(|| "session_id".to_string());
        if session_cookie_name.is_empty() || session_cookie_name.contains(['=', ';', ' ']) {
            return Err(ConfigError::Invalid("SESSION_COOKIE_NAME"));
        }

        let session_key_prefix =
            lookup("SESSION_KEY_PREFIX").unwrap_or_else(|| "session".to_string());

        let request_timeout_secs = lookup("REQUEST_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(30);

        let request_body_limit_bytes = lookup("REQUEST_BODY_LIMIT_BYTES")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(1024 * 1024);

        Ok(Self {
            addr,
            app_env,
            log_format,
            valkey_url,
            session_cookie_name,
            session_key_prefix,
            request_timeout: Duration::from_secs(request_timeout_secs),
            request_body_limit_bytes,
        })
    }
}
