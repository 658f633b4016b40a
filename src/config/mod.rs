//! Typed configuration.
//!
//! Secrets and endpoints come from environment variables, loaded once at
//! startup; the API key is wrapped in `secrecy::SecretString` to keep it out
//! of logs. Directories and tuning come from an optional TOML file, see
//! [`settings`].

pub mod settings;

pub use settings::Settings;

use crate::error::{Error, Result};
use secrecy::SecretString;

#[derive(Debug)]
pub struct Config {
    pub vision_api_key: SecretString,
    pub vision_endpoint: String,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            vision_api_key: SecretString::from(required_var("VISION_API_KEY")?),
            vision_endpoint: std::env::var("VISION_ENDPOINT")
                .unwrap_or_else(|_| crate::analysis::vision::DEFAULT_ENDPOINT.to_string()),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
}
