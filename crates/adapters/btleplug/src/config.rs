//! Backend configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the btleplug backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BtleplugConfig {
    /// Which host adapter to use, in the order the OS reports them.
    pub adapter_index: usize,
    /// While looking for a peripheral before connecting, how often the
    /// adapter's peripheral list is checked, in milliseconds.
    pub discovery_poll_ms: u64,
}

impl BtleplugConfig {
    #[must_use]
    pub const fn discovery_poll(&self) -> Duration {
        Duration::from_millis(self.discovery_poll_ms)
    }
}

impl Default for BtleplugConfig {
    fn default() -> Self {
        Self {
            adapter_index: 0,
            discovery_poll_ms: 500,
        }
    }
}
