//! Typed configuration.
//!
//! A transport is described by a `filesystem://` DSN plus an options map
//! (`directory`, required; `log`, optional). Options can come from code,
//! from a TOML file, or from environment variables for the CLI. Validation
//! happens here, before any filesystem access.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// DSN prefix handled by this crate.
pub const SCHEME: &str = "filesystem://";

/// Whether `dsn` names a filesystem transport.
pub fn supports(dsn: &str) -> bool {
    dsn.starts_with(SCHEME)
}

/// Validated transport settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Queue directory. Created on open if missing.
    pub directory: PathBuf,
    /// Append processed/failed entries to the outcome log.
    pub log: bool,
}

impl TransportConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            log: false,
        }
    }

    pub fn log(mut self, enabled: bool) -> Self {
        self.log = enabled;
        self
    }

    /// Validate an options map.
    ///
    /// `directory` must be present and a string. `log` falls back to `false`
    /// when absent or not a boolean.
    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let directory = match options.get("directory") {
            None | Some(Value::Null) => {
                return Err(Error::Configuration(
                    "the \"directory\" option must be set".into(),
                ));
            }
            Some(Value::String(dir)) if !dir.is_empty() => dir,
            Some(Value::String(_)) => {
                return Err(Error::Configuration(
                    "the \"directory\" option must not be empty".into(),
                ));
            }
            Some(_) => {
                return Err(Error::Configuration(
                    "the \"directory\" option must be a string".into(),
                ));
            }
        };

        let log = match options.get("log") {
            Some(Value::Bool(log)) => *log,
            Some(other) => {
                tracing::warn!(value = %other, "ignoring non-boolean \"log\" option");
                false
            }
            None => false,
        };

        Ok(Self {
            directory: PathBuf::from(directory),
            log,
        })
    }

    /// Check the DSN scheme, then validate the options.
    pub fn from_dsn(dsn: &str, options: &Map<String, Value>) -> Result<Self> {
        if !supports(dsn) {
            return Err(Error::Configuration(format!(
                "unsupported DSN {dsn:?}: expected {SCHEME}"
            )));
        }
        Self::from_options(options)
    }

    /// Read options from a TOML file with a top-level `dsn` key (optional,
    /// defaults to `filesystem://`) and the transport options next to it.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Configuration(format!("bad config {}: {e}", path.display())))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let table: toml::Table =
            toml::from_str(content).map_err(|e| Error::Configuration(e.to_string()))?;
        let options = match serde_json::to_value(&table) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(Error::Configuration("config is not a table".into())),
            Err(e) => return Err(Error::Configuration(e.to_string())),
        };
        let dsn = match options.get("dsn") {
            Some(Value::String(dsn)) => dsn.as_str(),
            Some(_) => {
                return Err(Error::Configuration("the \"dsn\" key must be a string".into()));
            }
            None => SCHEME,
        };
        Self::from_dsn(dsn, &options)
    }
}

/// Process-level settings for the CLI, from environment variables.
#[derive(Debug)]
pub struct Config {
    pub transport: TransportConfig,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let directory = required_var("FSQUEUE_DIRECTORY")?;
        let log = std::env::var("FSQUEUE_LOG")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            transport: TransportConfig::new(directory).log(log),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Configuration(format!("required environment variable {name} is not set")))
}
