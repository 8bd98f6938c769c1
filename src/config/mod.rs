//! Typed configuration from an optional TOML file and environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or a
//! numeric setting is not a positive integer. The database URL is wrapped
//! in `secrecy::SecretString` to keep credentials out of logs.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;

pub const DEFAULT_QUEUE: &str = "download_urls";
pub const DEFAULT_CONCURRENCY: usize = 1;
pub const DEFAULT_BUFFER_FACTOR: usize = 10;
pub const DEFAULT_STORAGE_DIR: &str = "./downloads";

#[derive(Debug)]
pub struct Config {
    /// Postgres (with pgmq) holding the queue and completion records.
    pub database_url: SecretString,
    /// Queue name; also the prefix of the completion bucket.
    pub queue: String,
    /// Maximum concurrent download tasks.
    pub concurrency: usize,
    /// Ingress buffer capacity is `concurrency * buffer_factor`.
    pub buffer_factor: usize,
    /// Root directory for saved payloads.
    pub storage_dir: PathBuf,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

/// Non-secret settings accepted from a TOML file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub queue: Option<String>,
    pub concurrency: Option<usize>,
    pub buffer_factor: Option<usize>,
    pub storage_dir: Option<PathBuf>,
    pub otel_endpoint: Option<String>,
    pub log_level: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("bad config file {}: {e}", path.display())))
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::layered(FileConfig::default())
    }

    /// Load `path` (if given), then let environment variables override it.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::layered(file)
    }

    fn layered(file: FileConfig) -> Result<Self> {
        let concurrency = match optional_var("URLQ_CONCURRENCY") {
            Some(v) => parse_positive("URLQ_CONCURRENCY", &v)?,
            None => file.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
        };
        let buffer_factor = match optional_var("URLQ_BUFFER_FACTOR") {
            Some(v) => parse_positive("URLQ_BUFFER_FACTOR", &v)?,
            None => file.buffer_factor.unwrap_or(DEFAULT_BUFFER_FACTOR),
        };

        let config = Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            queue: optional_var("URLQ_QUEUE")
                .or(file.queue)
                .unwrap_or_else(|| DEFAULT_QUEUE.to_string()),
            concurrency,
            buffer_factor,
            storage_dir: optional_var("URLQ_STORAGE_DIR")
                .map(PathBuf::from)
                .or(file.storage_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR)),
            otel_endpoint: optional_var("OTEL_ENDPOINT").or(file.otel_endpoint),
            log_level: optional_var("LOG_LEVEL")
                .or(file.log_level)
                .unwrap_or_else(|| "info".to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that hold no matter where a value came from.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".to_string()));
        }
        if self.buffer_factor == 0 {
            return Err(Error::Config("buffer_factor must be at least 1".to_string()));
        }
        validate_queue_name(&self.queue)
    }
}

/// pgmq queue names become table names: letters, digits and underscores.
pub fn validate_queue_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 47
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "invalid queue name {name:?}: use up to 47 letters, digits or underscores"
        )))
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_positive(name: &str, value: &str) -> Result<usize> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::Config(format!(
            "{name} must be a positive integer, got {value:?}"
        ))),
    }
}
