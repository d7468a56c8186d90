//! Downloader configuration
//!
//! Defaults applied to every request built through the downloader, plus the
//! engine-wide knobs. Loading this from a file is left to the caller; the
//! struct is serde-friendly for that purpose.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default connect timeout in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 20_000;

/// Default read timeout in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 20_000;

/// Main configuration for the downloader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloaderConfig {
    /// Directory used by `new_request_in_default_dir`
    pub download_dir: PathBuf,

    /// Connect timeout in milliseconds (0 = no timeout)
    pub connect_timeout_ms: u64,

    /// Per-read timeout in milliseconds (0 = no timeout)
    pub read_timeout_ms: u64,

    /// Maximum redirects the HTTP transport follows
    pub max_redirects: usize,

    /// User agent sent by the HTTP transport
    pub user_agent: String,

    /// Cap on simultaneously streaming transfers (None = unbounded)
    #[serde(default)]
    pub max_concurrent_downloads: Option<usize>,

    /// Continue partial temp files with a Range request instead of restarting
    #[serde(default)]
    pub range_resume: bool,

    /// Report pauses through `on_pause` instead of `on_error("Cancelled")`
    #[serde(default)]
    pub notify_pause: bool,

    /// Buffered events per subscriber before lagging ones drop events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_event_channel_capacity() -> usize {
    1024
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            download_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            max_redirects: 10,
            user_agent: format!("fetchq/{}", env!("CARGO_PKG_VERSION")),
            max_concurrent_downloads: None,
            range_resume: false,
            notify_pause: false,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl DownloaderConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default download directory
    pub fn download_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.download_dir = path.into();
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the read timeout
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = ua.into();
        self
    }

    /// Limit how many transfers stream at once
    pub fn max_concurrent_downloads(mut self, max: Option<usize>) -> Self {
        self.max_concurrent_downloads = max;
        self
    }

    /// Enable or disable Range-based continuation of partial files
    pub fn range_resume(mut self, enabled: bool) -> Self {
        self.range_resume = enabled;
        self
    }

    /// Deliver `on_pause` / `DownloadEvent::Paused` when a transfer is paused
    pub fn notify_pause(mut self, enabled: bool) -> Self {
        self.notify_pause = enabled;
        self
    }

    /// Connect timeout as a `Duration`
    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Read timeout as a `Duration`
    pub fn read_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_downloads == Some(0) {
            return Err(EngineError::invalid_input(
                "max_concurrent_downloads",
                "Must be at least 1 when set",
            ));
        }

        if self.event_channel_capacity == 0 {
            return Err(EngineError::invalid_input(
                "event_channel_capacity",
                "Must be at least 1",
            ));
        }

        if self.user_agent.trim().is_empty() {
            return Err(EngineError::invalid_input("user_agent", "Must not be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DownloaderConfig::default();
        assert_eq!(config.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
        assert_eq!(config.read_timeout_ms, DEFAULT_READ_TIMEOUT_MS);
        assert_eq!(config.max_concurrent_downloads, None);
        assert!(!config.range_resume);
        assert!(!config.notify_pause);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = DownloaderConfig::new()
            .connect_timeout(Duration::from_secs(5))
            .read_timeout(Duration::from_millis(750))
            .max_concurrent_downloads(Some(3))
            .range_resume(true)
            .notify_pause(true);

        assert_eq!(config.connect_timeout_duration(), Duration::from_secs(5));
        assert_eq!(config.read_timeout_duration(), Duration::from_millis(750));
        assert_eq!(config.max_concurrent_downloads, Some(3));
        assert!(config.range_resume);
        assert!(config.notify_pause);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = DownloaderConfig::new().max_concurrent_downloads(Some(0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_optional_fields_use_defaults() {
        let json = r#"{
            "download_dir": "/tmp",
            "connect_timeout_ms": 1000,
            "read_timeout_ms": 2000,
            "max_redirects": 5,
            "user_agent": "test"
        }"#;
        let config: DownloaderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.event_channel_capacity, 1024);
        assert!(!config.range_resume);
        assert!(!config.notify_pause);
        assert!(config.validate().is_ok());
    }
}
