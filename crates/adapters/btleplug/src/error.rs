//! Backend error types and the mapping of btleplug failures onto the
//! client port's [`BleError`].

use blegate_app::error::BleError;
use uuid::Uuid;

/// Errors raised while opening the backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The configured adapter index does not exist on this host.
    #[error("no BLE adapter at index {index} ({available} available)")]
    NotAvailable {
        /// Requested index.
        index: usize,
        /// Number of adapters the OS reported.
        available: usize,
    },

    /// The platform manager could not be created or queried.
    #[error("BLE manager error")]
    Manager(#[from] btleplug::Error),
}

/// Classify a btleplug failure. `uuid` names the characteristic the
/// operation targeted, when there is one.
pub(crate) fn ble_error(err: btleplug::Error, uuid: Option<Uuid>) -> BleError {
    match err {
        btleplug::Error::DeviceNotFound => BleError::DeviceNotFound,
        btleplug::Error::NotConnected => BleError::NotConnected,
        btleplug::Error::TimedOut(after) => BleError::Timeout(after),
        btleplug::Error::NotSupported(reason) => BleError::NotSupported { uuid, reason },
        btleplug::Error::NoSuchCharacteristic => match uuid {
            Some(uuid) => BleError::CharacteristicNotFound { uuid },
            None => BleError::Link(Box::new(btleplug::Error::NoSuchCharacteristic)),
        },
        other => BleError::Link(Box::new(other)),
    }
}
