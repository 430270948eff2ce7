//! Monitor configuration.
//!
//! Loaded from a TOML file and validated once at startup. Every validation
//! failure is a [`Error::Config`](crate::Error::Config).

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dispatch::handlers::WebhookConfig;
use crate::monitor::RateLimiterConfig;
use crate::source::{DEFAULT_SOURCE_URL, HttpFetcherConfig};
use crate::tags::DEFAULT_STRIP_CHARS;
use crate::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Terminate the process after a pipeline error has been reported.
    pub exit_on_error: bool,
    pub user_agent: String,
    /// Store location, e.g. `sqlite:tagwatch.db?mode=rwc`.
    pub database: String,
    /// Source URL template containing `{topic}`.
    pub source_url: String,
    pub request_timeout_secs: u64,
    pub topics: Vec<String>,
    pub global_tags: Vec<String>,
    /// Per-topic tag vocabularies; keys compare case-insensitively.
    pub topic_tags: HashMap<String, Vec<String>>,
    /// Characters stripped from titles and tags before matching.
    pub strip_chars: String,
    pub throttling: ThrottlingConfig,
    pub logging: LoggingSettings,
    pub webhooks: Vec<WebhookConfig>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            exit_on_error: false,
            user_agent: concat!("tagwatch/", env!("CARGO_PKG_VERSION")).to_string(),
            database: "sqlite:tagwatch.db?mode=rwc".to_string(),
            source_url: DEFAULT_SOURCE_URL.to_string(),
            request_timeout_secs: 10,
            topics: Vec::new(),
            global_tags: Vec::new(),
            topic_tags: HashMap::new(),
            strip_chars: DEFAULT_STRIP_CHARS.to_string(),
            throttling: ThrottlingConfig::default(),
            logging: LoggingSettings::default(),
            webhooks: Vec::new(),
        }
    }
}

/// What the loop does when no permit is available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleStrategy {
    /// Re-check immediately, yielding to the runtime in between.
    #[default]
    Spin,
    /// Sleep until the next window opens, capped by `max_idle_backoff_ms`.
    Backoff,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottlingConfig {
    /// Polls allowed per window.
    pub permits: u32,
    pub window_ms: u64,
    pub idle_strategy: IdleStrategy,
    pub max_idle_backoff_ms: u64,
}

impl Default for ThrottlingConfig {
    fn default() -> Self {
        Self {
            permits: 1,
            window_ms: 1000,
            idle_strategy: IdleStrategy::Spin,
            max_idle_backoff_ms: 250,
        }
    }
}

impl ThrottlingConfig {
    pub fn rate_limiter(&self) -> Result<RateLimiterConfig> {
        RateLimiterConfig::new(self.permits, Duration::from_millis(self.window_ms))
    }

    pub fn max_idle_backoff(&self) -> Duration {
        Duration::from_millis(self.max_idle_backoff_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub filter: Option<String>,
    /// Directory for daily-rotated log files. Console only when unset.
    pub directory: Option<String>,
}

impl MonitorConfig {
    /// Read, parse and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&raw)?;
        debug!(path = %path.display(), topics = config.topics.len(), "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let mut config: Self =
            toml::from_str(raw).map_err(|e| Error::config(format!("invalid configuration: {e}")))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    fn normalize(&mut self) {
        self.topic_tags = std::mem::take(&mut self.topic_tags)
            .into_iter()
            .fold(HashMap::new(), |mut acc, (topic, tags)| {
                acc.entry(topic.to_lowercase())
                    .or_insert_with(Vec::new)
                    .extend(tags);
                acc
            });
    }

    pub fn validate(&self) -> Result<()> {
        if self.topics.is_empty() {
            return Err(Error::config("at least one topic must be configured"));
        }
        if let Some(topic) = self.topics.iter().find(|t| t.trim().is_empty()) {
            return Err(Error::config(format!("invalid topic name '{topic}'")));
        }
        if self.user_agent.trim().is_empty() {
            return Err(Error::config("user_agent must not be empty"));
        }
        if !self.source_url.contains("{topic}") {
            return Err(Error::config(format!(
                "source_url '{}' must contain {{topic}}",
                self.source_url
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::config("request_timeout_secs must be positive"));
        }
        self.throttling.rate_limiter()?;
        Ok(())
    }

    pub fn fetcher(&self) -> HttpFetcherConfig {
        HttpFetcherConfig {
            url_template: self.source_url.clone(),
            user_agent: self.user_agent.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}
