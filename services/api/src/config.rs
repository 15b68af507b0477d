use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;
use tutor_core::config::{CycleGuard, TutorConfig};

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// OpenAI-compatible chat providers the oracle can talk to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Gemini,
}

impl Provider {
    pub fn default_api_base(&self) -> &'static str {
        match self {
            Provider::OpenAI => "https://api.openai.com/v1",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Absent means the in-memory store is used and nothing survives a restart.
    pub database_url: Option<String>,
    pub provider: Provider,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub oracle_base_url: Option<String>,
    pub oracle_timeout: Duration,
    pub chat_model: String,
    pub log_level: Level,
    pub prompts_path: PathBuf,
    pub tutor: TutorConfig,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address = parse_var::<SocketAddr>("BIND_ADDRESS", "0.0.0.0:3000")?;

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let provider_str = std::env::var("ORACLE_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let provider = match provider_str.to_lowercase().as_str() {
            "openai" => Provider::OpenAI,
            "gemini" => Provider::Gemini,
            other => {
                return Err(ConfigError::InvalidValue(
                    "ORACLE_PROVIDER".to_string(),
                    format!("'{other}' is not one of 'openai', 'gemini'"),
                ));
            }
        };

        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let gemini_api_key = std::env::var("GEMINI_API_KEY").ok();
        let oracle_base_url = std::env::var("ORACLE_BASE_URL").ok();

        let chat_model = std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4.1-nano".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompts_path = std::env::var("PROMPTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./prompts"));

        let oracle_timeout = Duration::from_secs(parse_var::<u64>("ORACLE_TIMEOUT_SECS", "60")?);

        let defaults = TutorConfig::default();
        let max_attempts = parse_var::<u32>("SYNTHESIS_MAX_ATTEMPTS", "3")?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "SYNTHESIS_MAX_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let tutor = TutorConfig {
            max_tree_depth: parse_var::<usize>("MAX_TREE_DEPTH", "5")?,
            cache_ttl_days: parse_var::<u32>("CACHE_TTL_DAYS", "7")?,
            synthesis_difficulty: std::env::var("SYNTHESIS_DIFFICULTY")
                .unwrap_or(defaults.synthesis_difficulty),
            max_attempts,
            cycle_guard: parse_var::<CycleGuard>("CYCLE_GUARD", "shared")?,
            learner_id: defaults.learner_id,
        };

        match provider {
            Provider::OpenAI => {
                if openai_api_key.is_none() {
                    return Err(ConfigError::MissingVar(
                        "OPENAI_API_KEY must be set for 'openai' provider".to_string(),
                    ));
                }
            }
            Provider::Gemini => {
                if gemini_api_key.is_none() {
                    return Err(ConfigError::MissingVar(
                        "GEMINI_API_KEY must be set for 'gemini' provider".to_string(),
                    ));
                }
            }
        }

        Ok(Self {
            bind_address,
            database_url,
            provider,
            openai_api_key,
            gemini_api_key,
            oracle_base_url,
            oracle_timeout,
            chat_model,
            log_level,
            prompts_path,
            tutor,
        })
    }

    /// The key for the configured provider.
    pub fn api_key(&self) -> Option<&str> {
        match self.provider {
            Provider::OpenAI => self.openai_api_key.as_deref(),
            Provider::Gemini => self.gemini_api_key.as_deref(),
        }
    }

    pub fn api_base(&self) -> &str {
        self.oracle_base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_base())
    }
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}
