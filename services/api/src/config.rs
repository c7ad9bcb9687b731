//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which backend serves multimodal generation (extraction and images).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerativeProvider {
    Gemini,
    /// Deterministic offline responses for local development. Also serves
    /// text generation, whatever `TEXT_PROVIDER` says.
    Scripted,
}

/// Which backend serves plain text generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextProvider {
    Gemini,
    OpenAi,
}

impl FromStr for GenerativeProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "scripted" => Ok(Self::Scripted),
            other => Err(format!("'{}' is not one of gemini, scripted", other)),
        }
    }
}

impl FromStr for TextProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            other => Err(format!("'{}' is not one of gemini, openai", other)),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// `None` runs against the in-memory store.
    pub database_url: Option<String>,
    pub log_level: Level,

    // --- Generative services ---
    pub generative_provider: GenerativeProvider,
    pub text_provider: TextProvider,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub gemini_text_model: String,
    pub gemini_document_model: String,
    pub gemini_image_model: String,
    pub openai_api_key: Option<String>,
    pub openai_text_model: String,

    // --- Object storage ---
    pub storage_root: PathBuf,
    pub public_base_url: String,
    pub storage_signing_secret: String,
    pub signed_url_ttl: Duration,

    // --- Pipeline ---
    pub planner_max_cards: usize,
    pub planner_min_cards: usize,
    pub planner_require_all_kinds: bool,
    pub generation_concurrency: usize,
    pub stale_status_after: Duration,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Load Server and Database Settings ---
        let bind_address = parse_var("BIND_ADDRESS", &var("BIND_ADDRESS", "0.0.0.0:3000"))?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let log_level_str = var("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Generative services ---
        let generative_provider =
            parse_var("GENERATIVE_PROVIDER", &var("GENERATIVE_PROVIDER", "gemini"))?;
        let text_provider = parse_var("TEXT_PROVIDER", &var("TEXT_PROVIDER", "gemini"))?;
        let gemini_api_key = lookup("GEMINI_API_KEY");
        let openai_api_key = lookup("OPENAI_API_KEY");

        if generative_provider == GenerativeProvider::Gemini && gemini_api_key.is_none() {
            return Err(ConfigError::MissingVar("GEMINI_API_KEY".to_string()));
        }
        if generative_provider == GenerativeProvider::Gemini
            && text_provider == TextProvider::OpenAi
            && openai_api_key.is_none()
        {
            return Err(ConfigError::MissingVar("OPENAI_API_KEY".to_string()));
        }

        // --- Object storage ---
        let storage_signing_secret = lookup("STORAGE_SIGNING_SECRET")
            .ok_or_else(|| ConfigError::MissingVar("STORAGE_SIGNING_SECRET".to_string()))?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            generative_provider,
            text_provider,
            gemini_api_key,
            gemini_base_url: var(
                "GEMINI_BASE_URL",
                "https://generativelanguage.googleapis.com/v1beta",
            ),
            gemini_text_model: var("GEMINI_TEXT_MODEL", "gemini-2.5-flash"),
            gemini_document_model: var("GEMINI_DOCUMENT_MODEL", "gemini-2.0-flash"),
            gemini_image_model: var("GEMINI_IMAGE_MODEL", "gemini-2.5-flash-image"),
            openai_api_key,
            openai_text_model: var("OPENAI_TEXT_MODEL", "gpt-4o-mini"),
            storage_root: PathBuf::from(var("STORAGE_ROOT", "./storage")),
            public_base_url: var("PUBLIC_BASE_URL", "http://localhost:3000")
                .trim_end_matches('/')
                .to_string(),
            storage_signing_secret,
            signed_url_ttl: Duration::from_secs(parse_var(
                "SIGNED_URL_TTL_SECS",
                &var("SIGNED_URL_TTL_SECS", "3600"),
            )?),
            planner_max_cards: parse_var("PLANNER_MAX_CARDS", &var("PLANNER_MAX_CARDS", "8"))?,
            planner_min_cards: parse_var("PLANNER_MIN_CARDS", &var("PLANNER_MIN_CARDS", "3"))?,
            planner_require_all_kinds: parse_var(
                "PLANNER_REQUIRE_ALL_KINDS",
                &var("PLANNER_REQUIRE_ALL_KINDS", "true"),
            )?,
            generation_concurrency: parse_var(
                "GENERATION_CONCURRENCY",
                &var("GENERATION_CONCURRENCY", "8"),
            )?,
            stale_status_after: Duration::from_secs(parse_var(
                "STALE_STATUS_AFTER_SECS",
                &var("STALE_STATUS_AFTER_SECS", "900"),
            )?),
            max_upload_bytes: parse_var(
                "MAX_UPLOAD_BYTES",
                &var("MAX_UPLOAD_BYTES", "20971520"),
            )?,
        })
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}
