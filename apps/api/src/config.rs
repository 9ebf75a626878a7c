use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Nothing is strictly required: a missing key only breaks the tiers routed to
/// that provider, and a missing `DATABASE_URL` selects the in-memory ledger.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub openai_api_key: String,
    pub anthropic_api_key: String,
    pub cohere_api_key: String,
    pub openai_base_url: Option<String>,
    pub anthropic_base_url: Option<String>,
    pub cohere_base_url: Option<String>,
    pub provider_timeout: Duration,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: optional_env("DATABASE_URL"),
            openai_api_key: optional_env("OPENAI_API_KEY").unwrap_or_default(),
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY").unwrap_or_default(),
            cohere_api_key: optional_env("COHERE_API_KEY").unwrap_or_default(),
            openai_base_url: optional_env("OPENAI_BASE_URL"),
            anthropic_base_url: optional_env("ANTHROPIC_BASE_URL"),
            cohere_base_url: optional_env("COHERE_BASE_URL"),
            provider_timeout: Duration::from_secs(
                parse_env("PROVIDER_TIMEOUT_SECS", 60)
                    .context("PROVIDER_TIMEOUT_SECS must be a whole number of seconds")?,
            ),
            port: parse_env("PORT", 8080).context("PORT must be a valid port number")?,
            rust_log: optional_env("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

/// Unset and blank variables are both treated as absent.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Invalid value '{raw}' for {key}")),
        None => Ok(default),
    }
}
