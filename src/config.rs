// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_CONFIG_PATH: &str = "LISTSIFT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/listsift.toml";

/// Explicit pipeline configuration, passed into the runner at construction.
/// Secrets (API keys, webhook URLs, SMTP credentials) stay in the
/// environment and are read where the respective client is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Upstream list identifier.
    pub list_id: String,
    /// Work-interest profile handed to the oracle verbatim.
    pub profile: String,
    #[serde(default = "default_min_likes")]
    pub min_likes: u64,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: u8,
    /// Bounded oracle fan-out.
    #[serde(default = "default_oracle_workers")]
    pub oracle_workers: usize,
    /// Attempts per transient failure (fetch and oracle alike).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for exponential backoff, doubled per attempt.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_dedupe_horizon_days")]
    pub dedupe_horizon_days: i64,
    /// Per-request timeout for every external call.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Override for tests; production uses the default upstream host.
    #[serde(default)]
    pub source_base_url: Option<String>,
    #[serde(default = "default_oracle_model")]
    pub oracle_model: String,
}

fn default_min_likes() -> u64 {
    10
}
fn default_score_threshold() -> u8 {
    7
}
fn default_oracle_workers() -> usize {
    4
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_dedupe_horizon_days() -> i64 {
    14
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}
fn default_oracle_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(s).context("parsing config toml")?;
        if cfg.list_id.trim().is_empty() {
            return Err(anyhow!("config: list_id must not be empty"));
        }
        if cfg.score_threshold > 10 {
            return Err(anyhow!("config: score_threshold must be 0..=10"));
        }
        if cfg.oracle_workers == 0 {
            return Err(anyhow!("config: oracle_workers must be at least 1"));
        }
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Load using `$LISTSIFT_CONFIG`, falling back to `config/listsift.toml`.
    pub fn load_default() -> Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }
}
