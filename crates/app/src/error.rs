//! Error types of the application layer.

use std::time::Duration;

use blegate_domain::error::ConfigError;
use uuid::Uuid;

/// Error reported by a BLE client or scanner.
#[derive(Debug, thiserror::Error)]
pub enum BleError {
    /// No usable Bluetooth adapter.
    #[error("no bluetooth adapter available")]
    AdapterUnavailable,

    /// The peripheral is not known to the adapter.
    #[error("device not found")]
    DeviceNotFound,

    /// The connected device exposes no characteristic with this UUID.
    #[error("characteristic {uuid} not found")]
    CharacteristicNotFound { uuid: Uuid },

    /// The characteristic exists but does not support the operation.
    #[error("operation not supported: {reason}")]
    NotSupported { uuid: Option<Uuid>, reason: String },

    /// No descriptor with this session handle.
    #[error("unknown descriptor handle {0:#06x}")]
    UnknownDescriptor(u16),

    /// The operation needs a connected session.
    #[error("not connected")]
    NotConnected,

    /// The operation did not complete in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Any other failure of the underlying link.
    #[error("link error: {0}")]
    Link(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl BleError {
    /// Wrap a free-form link failure.
    pub fn link(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::Link(message.into())
    }

    /// Transient errors concern a single item: the item is skipped and the
    /// session stays up. Everything else is treated as link loss.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::CharacteristicNotFound { .. }
                | Self::NotSupported { .. }
                | Self::UnknownDescriptor(_)
        )
    }
}

/// A device could not be set up. The device never starts.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    #[error("no converter registered under {name:?}")]
    ConverterNotFound { name: String },

    #[error("device {name:?} is already running")]
    DuplicateDevice { name: String },
}

/// Failure of a request issued to a running device worker.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("device is not connected")]
    NotConnected,

    #[error("device worker stopped")]
    Stopped,

    #[error("request timed out after {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Ble(#[from] BleError),
}

/// Failure to hand an envelope to the conversion pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatch queue is full")]
    Full,

    #[error("dispatch queue is closed")]
    Closed,
}
