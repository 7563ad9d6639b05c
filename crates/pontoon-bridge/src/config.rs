//! Bridge configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default deadline for [`crate::ClientBridge::invoke_sync`].
pub const DEFAULT_SYNC_TIMEOUT_MS: u64 = 5000;

/// Channel the host posts decode failures on.
pub const DEFAULT_ERROR_CHANNEL: &str = "error";

/// Tunables shared by the client bridge and the host dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Deadline in milliseconds for synchronous calls.
    pub sync_timeout_ms: u64,
    /// Channel used for error replies to undecodable messages.
    pub error_channel: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            sync_timeout_ms: DEFAULT_SYNC_TIMEOUT_MS,
            error_channel: DEFAULT_ERROR_CHANNEL.to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }
}
