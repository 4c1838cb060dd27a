use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::whitelist::Whitelist;
use crate::window::MAX_WINDOW_HOURS;

/// Floor on the spacing of LLM calls, whatever the config says.
pub const MIN_CALL_INTERVAL_MS: u64 = 2100;

/// Longest refresh interval accepted, one year in minutes.
pub const MAX_REFRESH_INTERVAL: u64 = 60 * 24 * 365;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Refresh interval in minutes, 0 runs once and exits
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    /// Retention window in hours
    #[serde(default = "default_hours_window")]
    pub hours_window: u64,
    #[serde(default = "default_whitelist_path")]
    pub whitelist_path: PathBuf,
    /// Latest-results JSON written after every run
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    /// Keep items rejected by the relevance gate in an audit table
    #[serde(default)]
    pub retain_rejected: bool,
    #[serde(default)]
    pub llm: LlmConfig,
    pub feeds: Vec<FeedConfig>,
}

fn default_refresh_interval() -> u64 {
    60
}

fn default_hours_window() -> u64 {
    24
}

fn default_whitelist_path() -> PathBuf {
    PathBuf::from("university_whitelist.csv")
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("evaluated_results.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    #[serde(alias = "university", default = "default_source_label")]
    pub name: String,
    #[serde(alias = "rss", default)]
    pub url: String,
}

fn default_source_label() -> String {
    "Google Alert".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the bearer token
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_score_timeout_secs")]
    pub score_timeout_secs: u64,
    #[serde(default = "default_dedup_timeout_secs")]
    pub dedup_timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_model() -> String {
    "llama3-8b-8192".to_string()
}

fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

fn default_min_interval_ms() -> u64 {
    MIN_CALL_INTERVAL_MS
}

fn default_score_timeout_secs() -> u64 {
    60
}

fn default_dedup_timeout_secs() -> u64 {
    30
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            min_interval_ms: default_min_interval_ms(),
            score_timeout_secs: default_score_timeout_secs(),
            dedup_timeout_secs: default_dedup_timeout_secs(),
        }
    }
}

impl LlmConfig {
    /// Configured spacing, raised to [`MIN_CALL_INTERVAL_MS`] when lower.
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms.max(MIN_CALL_INTERVAL_MS))
    }

    pub fn score_timeout(&self) -> Duration {
        Duration::from_secs(self.score_timeout_secs)
    }

    pub fn dedup_timeout(&self) -> Duration {
        Duration::from_secs(self.dedup_timeout_secs)
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            (1..=MAX_WINDOW_HOURS).contains(&self.hours_window),
            "hours_window must be between 1 and {}, got {}",
            MAX_WINDOW_HOURS,
            self.hours_window
        );
        anyhow::ensure!(
            self.refresh_interval <= MAX_REFRESH_INTERVAL,
            "refresh_interval must be at most {} minutes, got {}",
            MAX_REFRESH_INTERVAL,
            self.refresh_interval
        );
        Ok(())
    }

    /// Whitelist named by `whitelist_path`, `None` when the file is absent.
    pub fn load_whitelist(&self) -> anyhow::Result<Option<Whitelist>> {
        Whitelist::load(&self.whitelist_path)
    }
}
