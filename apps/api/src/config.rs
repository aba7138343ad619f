use anyhow::{Context, Result};

use crate::screening::EngineSettings;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub backend_url: String,
    pub backend_api_key: String,
    pub backend_timeout_secs: u64,
    pub port: u16,
    pub rust_log: String,
    pub engine: EngineSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            backend_url: require_env("BACKEND_URL")?,
            backend_api_key: std::env::var("BACKEND_API_KEY").unwrap_or_default(),
            backend_timeout_secs: parse_env("BACKEND_TIMEOUT_SECS")?.unwrap_or(120),
            port: parse_env("PORT")?.unwrap_or(8080),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            engine: EngineSettings::with_overrides(
                parse_env("AUTOSAVE_DEBOUNCE_MS")?,
                parse_env("HIGHLIGHT_WINDOW_MS")?,
                parse_env("EDITOR_IDLE_TTL_SECS")?,
            ),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("{key} must be a valid number")),
        Err(_) => Ok(None),
    }
}
