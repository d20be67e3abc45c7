use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::llm_client::{gemini, groq};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_RETENTION_SECS: u64 = 30 * 60;
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 5 * 60;
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_ACTIVE_JOBS: usize = 100;

/// Credentials and endpoint for one remote generation provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

/// Application configuration loaded from environment variables.
/// Startup fails if neither provider key is present.
#[derive(Debug, Clone)]
pub struct Config {
    pub gemini: Option<ProviderConfig>,
    pub groq: Option<ProviderConfig>,
    pub max_upload_bytes: usize,
    pub upload_dir: PathBuf,
    pub generated_dir: PathBuf,
    pub job_retention: Duration,
    pub cleanup_interval: Duration,
    pub provider_timeout: Duration,
    pub max_active_jobs: usize,
    pub delete_after_download: bool,
    pub prompt_template_path: Option<PathBuf>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let gemini = get("GOOGLE_API_KEY").map(|api_key| ProviderConfig {
            api_key: api_key.trim().to_string(),
            model: get("GEMINI_MODEL").unwrap_or_else(|| gemini::DEFAULT_MODEL.to_string()),
            base_url: get("GEMINI_API_BASE").unwrap_or_else(|| gemini::DEFAULT_BASE_URL.to_string()),
        });
        let groq = get("GROQ_API_KEY").map(|api_key| ProviderConfig {
            api_key: api_key.trim().to_string(),
            model: get("GROQ_MODEL").unwrap_or_else(|| groq::DEFAULT_MODEL.to_string()),
            base_url: get("GROQ_API_BASE").unwrap_or_else(|| groq::DEFAULT_BASE_URL.to_string()),
        });

        if gemini.is_none() && groq.is_none() {
            bail!("At least one of GOOGLE_API_KEY or GROQ_API_KEY must be set");
        }

        Ok(Config {
            gemini,
            groq,
            max_upload_bytes: parse_nonzero(&get, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            upload_dir: get("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("static/uploads")),
            generated_dir: get("GENERATED_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("static/generated")),
            job_retention: Duration::from_secs(parse_or(
                &get,
                "JOB_RETENTION_SECS",
                DEFAULT_RETENTION_SECS,
            )?),
            cleanup_interval: Duration::from_secs(parse_nonzero(
                &get,
                "CLEANUP_INTERVAL_SECS",
                DEFAULT_CLEANUP_INTERVAL_SECS,
            )?),
            provider_timeout: Duration::from_secs(parse_nonzero(
                &get,
                "PROVIDER_TIMEOUT_SECS",
                DEFAULT_PROVIDER_TIMEOUT_SECS,
            )?),
            max_active_jobs: parse_nonzero(&get, "MAX_ACTIVE_JOBS", DEFAULT_MAX_ACTIVE_JOBS)?,
            delete_after_download: parse_or(&get, "DELETE_AFTER_DOWNLOAD", true)?,
            prompt_template_path: get("PROMPT_TEMPLATE_PATH").map(PathBuf::from),
            port: parse_or(&get, "PORT", 8080u16).context("PORT must be a valid port number")?,
            rust_log: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Provider names in fallback order, for startup logging.
    pub fn provider_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.gemini.is_some() {
            names.push(gemini::NAME);
        }
        if self.groq.is_some() {
            names.push(groq::NAME);
        }
        names
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        None => Ok(default),
    }
}

/// Like [`parse_or`], but zero is refused: these values size timers, timeouts and limits.
fn parse_nonzero<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr + Default + PartialEq,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    let value = parse_or(get, key, default)?;
    if value == T::default() {
        bail!("Environment variable '{key}' must be greater than zero");
    }
    Ok(value)
}

#[cfg(test)]
impl Config {
    /// A config rooted in a scratch directory with a single fake provider slot.
    pub fn for_tests(root: &std::path::Path) -> Self {
        Config {
            gemini: Some(ProviderConfig {
                api_key: "test-key".to_string(),
                model: gemini::DEFAULT_MODEL.to_string(),
                base_url: "http://127.0.0.1:9".to_string(),
            }),
            groq: None,
            max_upload_bytes: 64 * 1024,
            upload_dir: root.join("uploads"),
            generated_dir: root.join("generated"),
            job_retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
            provider_timeout: Duration::from_secs(5),
            max_active_jobs: 8,
            delete_after_download: true,
            prompt_template_path: None,
            port: 0,
            rust_log: "debug".to_string(),
        }
    }
}
