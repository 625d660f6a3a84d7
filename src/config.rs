//! Feed configuration: TOML file with env path override and built-in defaults.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "FEED_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/feed.toml";

fn default_page_size() -> u32 {
    10
}
fn default_memory_cap() -> usize {
    crate::state::DEFAULT_MEMORY_CAP
}
fn default_prefetch_remaining() -> usize {
    5
}
fn default_paywall_threshold() -> usize {
    crate::navigation::DEFAULT_PAYWALL_THRESHOLD
}
fn default_window_radius() -> usize {
    crate::window::DEFAULT_WINDOW_RADIUS
}
fn default_rearm_delay_ms() -> u64 {
    crate::navigation::DEFAULT_REARM_DELAY_MS
}
fn default_retry_interval_ms() -> u64 {
    200
}
fn default_retry_attempts() -> u32 {
    crate::shared::DEFAULT_RETRY_ATTEMPTS
}
fn default_background_refresh_delay_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Upper bound on news stories held in memory.
    #[serde(default = "default_memory_cap")]
    pub memory_cap: usize,
    /// Request the next page once this many news stories (or fewer) remain ahead.
    #[serde(default = "default_prefetch_remaining")]
    pub prefetch_remaining: usize,
    #[serde(default = "default_paywall_threshold")]
    pub paywall_threshold: usize,
    #[serde(default = "default_window_radius")]
    pub window_radius: usize,
    #[serde(default = "default_rearm_delay_ms")]
    pub rearm_delay_ms: u64,
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// 0 disables the background refresh.
    #[serde(default = "default_background_refresh_delay_ms")]
    pub background_refresh_delay_ms: u64,
    #[serde(default)]
    pub greeting_name: Option<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            memory_cap: default_memory_cap(),
            prefetch_remaining: default_prefetch_remaining(),
            paywall_threshold: default_paywall_threshold(),
            window_radius: default_window_radius(),
            rearm_delay_ms: default_rearm_delay_ms(),
            retry_interval_ms: default_retry_interval_ms(),
            retry_attempts: default_retry_attempts(),
            background_refresh_delay_ms: default_background_refresh_delay_ms(),
            greeting_name: None,
        }
    }
}

impl FeedConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: FeedConfig = toml::from_str(s).context("parsing feed config")?;
        Ok(cfg.sanitized())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading feed config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Load using env var + fallbacks:
    /// 1) $FEED_CONFIG_PATH (must exist)
    /// 2) config/feed.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from(&pb);
        }
        let fallback = PathBuf::from(DEFAULT_CONFIG_PATH);
        if fallback.exists() {
            return Self::load_from(&fallback);
        }
        Ok(Self::default())
    }

    /// Clamp values that would break the engine.
    pub fn sanitized(mut self) -> Self {
        self.page_size = self.page_size.max(1);
        self.memory_cap = self.memory_cap.max(1);
        self.retry_attempts = self.retry_attempts.max(1);
        self.retry_interval_ms = self.retry_interval_ms.max(1);
        self.greeting_name = self
            .greeting_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        self
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn background_refresh_delay(&self) -> Option<Duration> {
        (self.background_refresh_delay_ms > 0)
            .then(|| Duration::from_millis(self.background_refresh_delay_ms))
    }
}
