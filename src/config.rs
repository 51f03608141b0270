//! Configuration loader and validator for the backhouse service.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub suggest: Suggest,
    pub alerts: Alerts,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct App {
    pub data_dir: String,
    /// Seconds between analysis job runs.
    pub check_interval_secs: u64,
}

/// Generative-text endpoint settings. An empty `api_key` is allowed: the
/// suggestion client then degrades to its fallback text without calling out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Suggest {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub base_delay_ms: u64,
    pub max_attempts: u32,
}

/// Alerting defaults applied when an inventory item carries no threshold of
/// its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alerts {
    pub default_low_stock_threshold: f64,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.check_interval_secs == 0 {
        return Err(ConfigError::Invalid("app.check_interval_secs must be > 0"));
    }

    // suggest.api_key may be empty; the client falls back without it.
    if cfg.suggest.model.trim().is_empty() {
        return Err(ConfigError::Invalid("suggest.model must be non-empty"));
    }
    if cfg.suggest.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("suggest.base_url must be non-empty"));
    }
    if cfg.suggest.base_delay_ms == 0 {
        return Err(ConfigError::Invalid("suggest.base_delay_ms must be > 0"));
    }
    if cfg.suggest.max_attempts == 0 {
        return Err(ConfigError::Invalid("suggest.max_attempts must be > 0"));
    }

    if !cfg.alerts.default_low_stock_threshold.is_finite()
        || cfg.alerts.default_low_stock_threshold < 0.0
    {
        return Err(ConfigError::Invalid(
            "alerts.default_low_stock_threshold must be a finite number >= 0",
        ));
    }

    Ok(())
}

/// Example YAML document used in docs and tests.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  check_interval_secs: 3600

suggest:
  api_key: "YOUR_GENERATIVE_API_KEY"
  model: "gemini-2.5-flash-preview-09-2025"
  base_url: "https://generativelanguage.googleapis.com/"
  base_delay_ms: 1000
  max_attempts: 3

alerts:
  default_low_stock_threshold: 10
"#
}
