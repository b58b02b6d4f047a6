// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Router configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Router configuration.
///
/// Loaded from a JSON file and overridden by CLI flags. Timeouts are in
/// milliseconds so tests can exercise them without waiting out the
/// production defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Unix socket path the daemon listens on.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Soft limit on connected peers; HELLO beyond it is refused.
    #[serde(default = "default_max_peers")]
    pub max_peers: usize,

    /// Upper bound on a single inbound frame body (bytes).
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Per-peer outbound queue cap (bytes); overflow drops frames.
    #[serde(default = "default_max_outbound_bytes")]
    pub max_outbound_bytes: usize,

    /// How long a fresh connection may sit without sending HELLO.
    #[serde(default = "default_greeting_timeout_ms")]
    pub greeting_timeout_ms: u64,

    /// Idle time before the router probes a peer with PING.
    #[serde(default = "default_ping_idle_ms")]
    pub ping_idle_ms: u64,

    /// Grace period for the PONG answer.
    #[serde(default = "default_pong_timeout_ms")]
    pub pong_timeout_ms: u64,

    /// How long closing connections are drained before a forced close.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,

    /// Interval between statistics summaries in the log (seconds).
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/routio.sock")
}

fn default_max_peers() -> usize {
    4096
}

fn default_max_frame_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_max_outbound_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_greeting_timeout_ms() -> u64 {
    5_000
}

fn default_ping_idle_ms() -> u64 {
    30_000
}

fn default_pong_timeout_ms() -> u64 {
    10_000
}

fn default_drain_timeout_ms() -> u64 {
    2_000
}

fn default_stats_interval_secs() -> u64 {
    60
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            max_peers: default_max_peers(),
            max_frame_bytes: default_max_frame_bytes(),
            max_outbound_bytes: default_max_outbound_bytes(),
            greeting_timeout_ms: default_greeting_timeout_ms(),
            ping_idle_ms: default_ping_idle_ms(),
            pong_timeout_ms: default_pong_timeout_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

impl RouterConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Greeting deadline as a `Duration`.
    pub fn greeting_timeout(&self) -> Duration {
        Duration::from_millis(self.greeting_timeout_ms)
    }

    /// Idle threshold before a liveness probe.
    pub fn ping_idle(&self) -> Duration {
        Duration::from_millis(self.ping_idle_ms)
    }

    /// PONG grace period.
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }

    /// Drain bound for closing connections.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Interval between statistics summaries.
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.socket_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue("socket_path cannot be empty".into()));
        }
        if self.max_peers == 0 {
            return Err(ConfigError::InvalidValue("max_peers cannot be 0".into()));
        }
        if self.max_frame_bytes == 0 {
            return Err(ConfigError::InvalidValue(
                "max_frame_bytes cannot be 0".into(),
            ));
        }
        if self.max_outbound_bytes == 0 {
            return Err(ConfigError::InvalidValue(
                "max_outbound_bytes cannot be 0".into(),
            ));
        }
        if self.greeting_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "greeting_timeout_ms cannot be 0".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("I/O error: {0}")]
    Io(String),

    /// Config file was not valid JSON.
    #[error("parse error: {0}")]
    Parse(String),

    /// A field failed validation.
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RouterConfig::default();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/routio.sock"));
        assert_eq!(config.max_peers, 4096);
        assert_eq!(config.max_outbound_bytes, 16 * 1024 * 1024);
        assert_eq!(config.max_frame_bytes, 64 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = RouterConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: RouterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.max_peers, config.max_peers);
        assert_eq!(parsed.socket_path, config.socket_path);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: RouterConfig =
            serde_json::from_str(r#"{ "max_peers": 16 }"#).unwrap();
        assert_eq!(parsed.max_peers, 16);
        assert_eq!(parsed.greeting_timeout_ms, 5_000);
    }

    #[test]
    fn test_validation_rejects_zero_caps() {
        let config = RouterConfig {
            max_outbound_bytes: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RouterConfig {
            max_peers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_accessors() {
        let config = RouterConfig {
            greeting_timeout_ms: 250,
            ..Default::default()
        };
        assert_eq!(config.greeting_timeout(), Duration::from_millis(250));
        assert_eq!(config.pong_timeout(), Duration::from_millis(10_000));
    }
}
