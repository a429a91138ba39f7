//! Connection configuration.
//!
//! A [`SpreadConfig`] carries everything needed to reach a daemon: client
//! name, host/port, the default channel, and the tunables for the settle
//! window and reconnect policy. It derives `Deserialize` so deployments can
//! load it from JSON:
//!
//! ```
//! use spread_client::SpreadConfig;
//!
//! let config = SpreadConfig::from_json_str(
//!     r#"{ "name": "svc1", "host": "127.0.0.1", "default_channel": "chat" }"#,
//! ).unwrap();
//! assert_eq!(config.port, 4803);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, SpreadError};
use crate::protocol::{DEFAULT_MAX_FRAME_BYTES, GROUP_NAME_LEN, MAX_CLIENT_NAME_LEN};

/// Default daemon port.
pub const DEFAULT_PORT: u16 = 4803;

/// Default settle window after authentication (10 s), matching the daemon
/// deployment convention of letting other members join before traffic
/// starts.
pub const DEFAULT_SETTLE_MS: u64 = 10_000;

/// Default initial reconnect delay.
pub const DEFAULT_RECONNECT_INITIAL_MS: u64 = 500;

/// Default reconnect delay cap.
pub const DEFAULT_RECONNECT_MAX_MS: u64 = 30_000;

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_true() -> bool {
    true
}

fn default_settle_ms() -> u64 {
    DEFAULT_SETTLE_MS
}

fn default_reconnect_initial_ms() -> u64 {
    DEFAULT_RECONNECT_INITIAL_MS
}

fn default_reconnect_max_ms() -> u64 {
    DEFAULT_RECONNECT_MAX_MS
}

fn default_max_frame_bytes() -> u32 {
    DEFAULT_MAX_FRAME_BYTES
}

/// Configuration for one logical daemon connection.
#[derive(Debug, Clone, Deserialize)]
pub struct SpreadConfig {
    /// Client display name, sent in the identity frame (≤ 255 bytes).
    pub name: String,
    /// Daemon host or IP address.
    pub host: String,
    /// Daemon TCP port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Channel joined/sent to when no explicit channel is given (≤ 32 bytes).
    pub default_channel: String,
    /// Reconnect automatically after the connection closes.
    #[serde(default = "default_true")]
    pub reconnect: bool,
    /// Settle window after authentication before queued sends flush, in ms.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Initial reconnect delay, in ms. Doubles per attempt up to the cap.
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    /// Reconnect delay cap, in ms.
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
    /// Maximum accepted trailing length per inbound frame.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: u32,
}

impl SpreadConfig {
    /// Create a configuration with default tunables.
    pub fn new(name: &str, host: &str, port: u16, default_channel: &str) -> Self {
        Self {
            name: name.to_string(),
            host: host.to_string(),
            port,
            default_channel: default_channel.to_string(),
            reconnect: true,
            settle_ms: DEFAULT_SETTLE_MS,
            reconnect_initial_ms: DEFAULT_RECONNECT_INITIAL_MS,
            reconnect_max_ms: DEFAULT_RECONNECT_MAX_MS,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    /// Load a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Validate field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(SpreadError::Config("client name is empty".to_string()));
        }
        if self.name.len() > MAX_CLIENT_NAME_LEN {
            return Err(SpreadError::Config(format!(
                "client name exceeds {} bytes",
                MAX_CLIENT_NAME_LEN
            )));
        }
        if self.default_channel.is_empty() {
            return Err(SpreadError::Config("default channel is empty".to_string()));
        }
        if self.default_channel.len() > GROUP_NAME_LEN {
            return Err(SpreadError::Config(format!(
                "default channel exceeds {} bytes",
                GROUP_NAME_LEN
            )));
        }
        if self.port == 0 {
            return Err(SpreadError::Config("port must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Settle window as a `Duration`.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Initial reconnect delay as a `Duration`.
    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    /// Reconnect delay cap as a `Duration`.
    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }
}
