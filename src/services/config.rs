//! Persisted client settings, kept apart from runtime state: presence,
//! typing, and connection status never touch this layer.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ChatError, Result};

/// Chat client settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    /// Base URL of the REST API.
    pub api_base_url: String,
    /// URL of the realtime socket endpoint.
    pub socket_url: String,
    /// Seconds between keepalive pings on the live socket.
    pub heartbeat_interval_secs: u64,
    /// Base delay for reconnect backoff (doubled per attempt).
    pub reconnect_base_delay_ms: u64,
    /// Reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Seconds to wait for a socket action acknowledgement.
    pub ack_timeout_secs: u64,
    /// Seconds before an HTTP request is abandoned.
    pub request_timeout_secs: u64,
    /// Milliseconds of input silence before a local stop-typing is sent.
    pub typing_stop_delay_ms: u64,
    /// Messages fetched per history page.
    pub message_page_size: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8080/api".to_string(),
            socket_url: "ws://127.0.0.1:8080/ws".to_string(),
            heartbeat_interval_secs: 30,
            reconnect_base_delay_ms: 1000,
            max_reconnect_attempts: 5,
            ack_timeout_secs: 10,
            request_timeout_secs: 10,
            typing_stop_delay_ms: 1000,
            message_page_size: 50,
        }
    }
}

impl ChatConfig {
    /// Default config file location.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("archivist-chat").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from(".archivist-chat/config.toml"))
    }

    /// Load settings: defaults, overridden by the TOML file (if present),
    /// overridden by `ARCHIVIST_CHAT_*` environment variables.
    pub fn load(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::Config::try_from(&ChatConfig::default())
                    .map_err(|e| ChatError::Config(e.to_string()))?,
            )
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix("ARCHIVIST_CHAT").try_parsing(true))
            .build()
            .map_err(|e| ChatError::Config(e.to_string()))?;

        settings
            .try_deserialize()
            .map_err(|e| ChatError::Config(e.to_string()))
    }

    /// Write settings back to disk as TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = toml::to_string_pretty(self).map_err(|e| ChatError::Config(e.to_string()))?;
        std::fs::write(path, data)?;
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        // interval(0) panics; a silent heartbeat is the closest meaning.
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn typing_stop_delay(&self) -> Duration {
        Duration::from_millis(self.typing_stop_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = ChatConfig::load(&tmp.path().join("nope.toml")).unwrap();
        assert_eq!(cfg, ChatConfig::default());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");

        let mut cfg = ChatConfig::default();
        cfg.api_base_url = "https://chat.example.com/api".to_string();
        cfg.max_reconnect_attempts = 9;
        cfg.save(&path).unwrap();

        let loaded = ChatConfig::load(&path).unwrap();
        assert_eq!(loaded.api_base_url, "https://chat.example.com/api");
        assert_eq!(loaded.max_reconnect_attempts, 9);
        assert_eq!(loaded.message_page_size, 50);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "heartbeat_interval_secs = 5\n").unwrap();

        let cfg = ChatConfig::load(&path).unwrap();
        assert_eq!(cfg.heartbeat_interval_secs, 5);
        assert_eq!(cfg.reconnect_base_delay_ms, 1000);
    }
}
