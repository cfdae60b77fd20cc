//! # blegate-adapter-btleplug
//!
//! Real BLE backend over [`btleplug`]: GATT client sessions and scan passes
//! on one host adapter.
//!
//! ## How it works
//!
//! [`BtleplugBackend::open`] picks a host adapter. Every device worker then
//! gets its own [`BtleplugClient`] bound to the device address, plus a
//! [`BtleplugScanner`] for the advertisement fallback. Clients look up the
//! peripheral among those the adapter already knows and scan for it only
//! when it is missing.
//!
//! All of them share the adapter's discovery state. Discovery starts with
//! the first open scan window and stops when the last one closes, and a
//! scan pass only reports devices that advertised during its own window.
//!
//! ## Dependency rule
//!
//! Depends on `blegate-app` (ports) and `blegate-domain`.

mod client;
mod config;
mod error;
mod scan_session;
mod scanner;

pub use client::BtleplugClient;
pub use config::BtleplugConfig;
pub use error::BackendError;
pub use scanner::BtleplugScanner;

use std::sync::Arc;
use std::time::Duration;

use blegate_app::ports::BleBackend;
use blegate_domain::address::MacAddress;
use btleplug::api::{Central as _, Manager as _};
use btleplug::platform::Manager;
use scan_session::ScanSessions;

/// [`BleBackend`] handing out btleplug clients and scanners.
#[derive(Clone)]
pub struct BtleplugBackend {
    sessions: Arc<ScanSessions>,
    discovery_poll: Duration,
}

impl std::fmt::Debug for BtleplugBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleplugBackend")
            .field("discovery_poll", &self.discovery_poll)
            .finish_non_exhaustive()
    }
}

impl BtleplugBackend {
    /// Open the adapter selected by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotAvailable`] when the host has no adapter
    /// at the configured index, or [`BackendError::Manager`] when the
    /// platform stack cannot be queried.
    pub async fn open(config: &BtleplugConfig) -> Result<Self, BackendError> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let available = adapters.len();
        let adapter = adapters
            .into_iter()
            .nth(config.adapter_index)
            .ok_or(BackendError::NotAvailable {
                index: config.adapter_index,
                available,
            })?;

        match adapter.adapter_info().await {
            Ok(info) => tracing::info!(adapter = %info, "BLE adapter opened"),
            Err(err) => tracing::warn!(%err, "BLE adapter opened, info unavailable"),
        }

        Ok(Self {
            sessions: Arc::new(ScanSessions::new(adapter)),
            discovery_poll: config.discovery_poll(),
        })
    }
}

impl BleBackend for BtleplugBackend {
    type Client = BtleplugClient;
    type Scanner = BtleplugScanner;

    fn client(&self, address: &MacAddress) -> BtleplugClient {
        BtleplugClient::new(Arc::clone(&self.sessions), address, self.discovery_poll)
    }

    fn scanner(&self) -> BtleplugScanner {
        BtleplugScanner::new(Arc::clone(&self.sessions))
    }
}
