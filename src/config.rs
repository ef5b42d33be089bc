use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_URL_ENV: &str = "ASK_API_URL";
pub const TIMEOUT_ENV: &str = "ASK_TIMEOUT_SECS";

const DEFAULT_API_URL: &str = "http://localhost:8080";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_url: String,
    /// Whole-request timeout; 0 disables it.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Apply environment overrides on top of the file values.
    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(url) = lookup(API_URL_ENV) {
            self.api_url = url;
        }
        if let Some(raw) = lookup(TIMEOUT_ENV) {
            self.timeout_secs = raw
                .trim()
                .parse()
                .with_context(|| format!("{TIMEOUT_ENV} must be a whole number of seconds, got {raw:?}"))?;
        }
        Ok(self)
    }
}

pub fn app_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
    let dir = home.join(".ask-form");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Resolve the configuration once at startup: the config file (created with
/// defaults if missing), then the environment.
pub fn load_config() -> Result<Config> {
    let path = app_dir()?.join("config.json");
    load_from(&path)?.with_overrides(|key| std::env::var(key).ok())
}

fn load_from(path: &Path) -> Result<Config> {
    if path.exists() {
        let bytes = std::fs::read(path)?;
        let cfg: Config = serde_json::from_slice(&bytes)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        return Ok(cfg);
    }

    let default = Config::default();
    let json = serde_json::to_vec_pretty(&default)?;
    std::fs::write(path, json)?;
    Ok(default)
}
