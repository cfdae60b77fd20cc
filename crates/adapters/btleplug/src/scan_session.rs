//! Scanning shared by every client and scanner on one adapter.
//!
//! The adapter has a single discovery state. Workers overlap their scan
//! windows, so start and stop are reference counted: the first holder
//! starts discovery and the last one stops it.

use blegate_app::error::BleError;
use btleplug::api::{Central as _, ScanFilter};
use btleplug::platform::Adapter;
use tokio::sync::Mutex;

use crate::error::ble_error;

/// Number of scan windows currently open.
#[derive(Debug, Default)]
pub(crate) struct ScanCount {
    active: usize,
}

impl ScanCount {
    /// Whether opening a window has to start discovery.
    pub(crate) const fn needs_start(&self) -> bool {
        self.active == 0
    }

    pub(crate) const fn acquire(&mut self) {
        self.active += 1;
    }

    /// Close a window. Returns `true` when it was the last one.
    pub(crate) const fn release(&mut self) -> bool {
        self.active = self.active.saturating_sub(1);
        self.active == 0
    }
}

/// Reference-counted discovery on a shared adapter.
pub(crate) struct ScanSessions {
    adapter: Adapter,
    count: Mutex<ScanCount>,
}

impl ScanSessions {
    pub(crate) fn new(adapter: Adapter) -> Self {
        Self {
            adapter,
            count: Mutex::new(ScanCount::default()),
        }
    }

    pub(crate) const fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Open a scan window. Every successful call must be paired with
    /// [`end`](Self::end).
    pub(crate) async fn begin(&self) -> Result<(), BleError> {
        let mut count = self.count.lock().await;
        if count.needs_start() {
            self.adapter
                .start_scan(ScanFilter::default())
                .await
                .map_err(|err| ble_error(err, None))?;
        }
        count.acquire();
        Ok(())
    }

    pub(crate) async fn end(&self) {
        let mut count = self.count.lock().await;
        if count.release()
            && let Err(err) = self.adapter.stop_scan().await
        {
            tracing::warn!(%err, "failed to stop scan");
        }
    }
}
