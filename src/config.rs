//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - Environment variables (`PROVQL_*` prefix)
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! [execution]
//! default_batch_size = 100
//! strict_validation = true
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! PROVQL_EXECUTION__DEFAULT_BATCH_SIZE=500
//! PROVQL_LOGGING__LEVEL=debug
//! ```

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Main configuration struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Query-execution tuning: everything the emitter/result adapter consult at
/// run time rather than baking into the AST.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Default page size for `QueryBuilder::iter` when the caller passes
    /// `None`. Historically 100.
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,

    /// Reject ambiguous class targets and unresolvable discriminators
    /// outright instead of falling back to a best-effort guess. Off lets a
    /// caller run against a registry that hasn't registered every subclass
    /// yet; on is meant for CI / production wiring.
    #[serde(default)]
    pub strict_validation: bool,
}

fn default_batch_size() -> usize {
    100
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig { default_batch_size: default_batch_size(), strict_validation: false }
    }
}

/// Logging configuration, consumed by whatever installs the `tracing`
/// subscriber (left to the host binary; this crate only emits spans).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { level: default_log_level(), format: default_log_format() }
    }
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Merges in order:
    /// 1. `config.toml` (base configuration)
    /// 2. `config.local.toml` (local overrides, git-ignored)
    /// 3. Environment variables (`PROVQL_*` prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("PROVQL_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path.
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new().merge(Toml::file(path)).merge(Env::prefixed("PROVQL_").split("__")).extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config { execution: ExecutionConfig::default(), logging: LoggingConfig::default() }
    }
}
