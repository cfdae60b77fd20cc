//! Advertisement fallback: acquisition without a connection.

use std::sync::Arc;
use std::time::Duration;

use blegate_domain::address::MacAddress;
use blegate_domain::scan::ScanResult;

use crate::envelope::SourceConfig;
use crate::ports::{ScanMode, Scanner};

/// Result of one scan pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The first manufacturer data block of the device.
    Payload(Vec<u8>),
    /// The device was not seen.
    NotFound,
    /// The device was seen but advertised no manufacturer data.
    NoManufacturerData,
    /// The scan itself failed.
    Failed,
}

/// Scans for one device and extracts its manufacturer payload.
#[derive(Debug, Clone)]
pub struct AdvertisementEngine {
    address: MacAddress,
    timeout: Duration,
    mode: ScanMode,
    source: Arc<SourceConfig>,
}

impl AdvertisementEngine {
    #[must_use]
    pub fn new(address: MacAddress, timeout: Duration, source: Arc<SourceConfig>) -> Self {
        Self {
            address,
            timeout,
            mode: ScanMode::Active,
            source,
        }
    }

    /// Source config for envelopes built from advertisements.
    #[must_use]
    pub fn source(&self) -> Arc<SourceConfig> {
        Arc::clone(&self.source)
    }

    /// Run one scan pass lasting the device timeout. Misses and scan
    /// failures are logged, never returned as errors.
    pub async fn pass<S: Scanner>(&self, scanner: &S, device: &str) -> ScanOutcome {
        self.pass_within(scanner, device, self.timeout).await
    }

    /// Like [`pass`](Self::pass), but the scan never outlasts `budget`.
    pub async fn pass_within<S: Scanner>(
        &self,
        scanner: &S,
        device: &str,
        budget: Duration,
    ) -> ScanOutcome {
        let results = match scanner.scan(self.timeout.min(budget), self.mode).await {
            Ok(results) => results,
            Err(err) => {
                tracing::warn!(device, %err, "scan failed");
                return ScanOutcome::Failed;
            }
        };

        let outcome = self.select(&results);
        match &outcome {
            ScanOutcome::Payload(data) => {
                tracing::trace!(device, len = data.len(), "advertisement captured");
            }
            ScanOutcome::NotFound => {
                tracing::warn!(device, address = %self.address, "device not found during scan");
            }
            ScanOutcome::NoManufacturerData => {
                tracing::warn!(device, "advertisement carries no manufacturer data");
            }
            ScanOutcome::Failed => {}
        }
        outcome
    }

    /// Pick this engine's device out of `results`.
    #[must_use]
    pub fn select(&self, results: &[ScanResult]) -> ScanOutcome {
        let Some(found) = results.iter().find(|result| result.address == self.address) else {
            return ScanOutcome::NotFound;
        };
        found
            .first_manufacturer_payload()
            .map_or(ScanOutcome::NoManufacturerData, |data| {
                ScanOutcome::Payload(data.to_vec())
            })
    }
}
