//! Link configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```
//! use mlf_proto::LinkConfig;
//!
//! let config = LinkConfig::from_json_str(r#"{ "name": "uart", "send_attempts": 30 }"#).unwrap();
//! assert_eq!(config.name, "uart");
//! assert_eq!(config.send_attempts, 30);
//! assert!(config.verify_checksum);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::MAX_DATA_SIZE;
use crate::retry::{RetryPolicy, DEFAULT_RETRY_DELAY, DEFAULT_SEND_ATTEMPTS};

/// Default capacity of the response staging buffer.
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 64;

/// Default time an invoker waits for its response.
pub const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default lifetime of a forwarded request awaiting its reply.
pub const DEFAULT_RELAY_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default frame capacity of the writer task queue.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Default read size of the link read loop.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 64;

/// Settings for one link and its protocol context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Name used in log lines.
    pub name: String,
    /// Reject frames whose footer checksum does not match.
    pub verify_checksum: bool,
    /// Gap after which a partial packet is discarded.
    pub stale_timeout_ms: u64,
    /// Write attempts per outbound packet.
    pub send_attempts: u32,
    /// Delay between write attempts.
    pub retry_delay_ms: u64,
    /// Response payloads longer than this are truncated.
    pub max_response_size: usize,
    /// Invoker response deadline.
    pub invoke_timeout_ms: u64,
    /// Forwarded request reply deadline.
    pub relay_timeout_ms: u64,
    /// Writer task queue capacity, in packets.
    pub channel_capacity: usize,
    /// Bytes requested per read by the link driver.
    pub read_chunk_size: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            name: "mlf".to_string(),
            verify_checksum: true,
            stale_timeout_ms: 1000,
            send_attempts: DEFAULT_SEND_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY.as_millis() as u64,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            invoke_timeout_ms: DEFAULT_INVOKE_TIMEOUT.as_millis() as u64,
            relay_timeout_ms: DEFAULT_RELAY_TIMEOUT.as_millis() as u64,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

impl LinkConfig {
    /// Default settings under a different link name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn stale_timeout(&self) -> Duration {
        Duration::from_millis(self.stale_timeout_ms)
    }

    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_millis(self.invoke_timeout_ms)
    }

    pub fn relay_timeout(&self) -> Duration {
        Duration::from_millis(self.relay_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.send_attempts, Duration::from_millis(self.retry_delay_ms))
    }

    /// Response staging capacity, never above `MAX_DATA_SIZE`.
    pub fn response_capacity(&self) -> usize {
        self.max_response_size.min(MAX_DATA_SIZE)
    }

    /// Writer queue capacity, at least one.
    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity.max(1)
    }

    /// Read chunk size, at least one byte.
    pub fn read_chunk_size(&self) -> usize {
        self.read_chunk_size.max(1)
    }
}
