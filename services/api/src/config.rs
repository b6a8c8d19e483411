//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    /// Root of the document registry and the key-value blobs.
    pub data_dir: PathBuf,
    pub allowed_origin: String,
    pub completion_endpoint: String,
    pub completion_api_key: Option<String>,
    pub completion_model: String,
    pub completion_max_tokens: u32,
    pub history_window: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var_or = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        // --- Server Settings ---
        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let data_dir = PathBuf::from(var_or("DATA_DIR", "./data"));
        let allowed_origin = var_or("ALLOWED_ORIGIN", "http://localhost:3000");

        // --- Completion Endpoint Settings ---
        let completion_endpoint = lookup("COMPLETION_ENDPOINT")
            .ok_or_else(|| ConfigError::MissingVar("COMPLETION_ENDPOINT".to_string()))?;
        let completion_api_key = lookup("COMPLETION_API_KEY").filter(|key| !key.is_empty());
        let completion_model = var_or("COMPLETION_MODEL", "gpt-4o");
        let completion_max_tokens = parse_number("COMPLETION_MAX_TOKENS", &var_or("COMPLETION_MAX_TOKENS", "4096"))?;
        let history_window = parse_number("HISTORY_WINDOW", &var_or("HISTORY_WINDOW", "10"))?;

        Ok(Self {
            bind_address,
            log_level,
            data_dir,
            allowed_origin,
            completion_endpoint,
            completion_api_key,
            completion_model,
            completion_max_tokens,
            history_window,
        })
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}
