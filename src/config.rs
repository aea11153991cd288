//! Environment-driven configuration.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Service configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Seller account client id (`Client-Id` header).
    pub ozon_client_id: String,
    /// Seller API key (`Api-Key` header).
    pub ozon_api_key: SecretString,
    /// Completion backend API key.
    pub deepseek_api_key: SecretString,
    /// Ledger database location.
    pub database_path: PathBuf,
    /// Sleep between pipeline cycles.
    pub run_interval: Duration,
    /// Rolling hourly cap on successful posts.
    pub max_responses_per_hour: u32,
    /// Whether posting a comment marks the review processed upstream.
    pub mark_as_processed: bool,
}

impl BotConfig {
    /// Read configuration from the environment.
    ///
    /// Credentials are required and produce [`ConfigError::MissingEnvVar`]
    /// when absent; everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            ozon_client_id: require("OZON_CLIENT_ID")?,
            ozon_api_key: SecretString::from(require("OZON_API_KEY")?),
            deepseek_api_key: SecretString::from(require("DEEPSEEK_API_KEY")?),
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "./data/review-assist.db".to_string())
                .into(),
            run_interval: Duration::from_secs(parse_or("BOT_RUN_INTERVAL", 3600)?),
            max_responses_per_hour: parse_or("MAX_RESPONSES_PER_HOUR", 10)?,
            mark_as_processed: parse_bool_or("MARK_AS_PROCESSED", true)?,
        })
    }
}

fn require(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Parse a numeric variable, falling back to `default` when unset.
fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a number, got {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}

/// Parse a boolean variable, falling back to `default` when unset.
fn parse_bool_or(key: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
