//! Scanner port.

use std::future::Future;
use std::time::Duration;

use blegate_domain::scan::ScanResult;

use crate::error::BleError;

/// Whether the scanner sends scan requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanMode {
    /// Request scan responses, which carry names and extra data.
    #[default]
    Active,
    /// Listen only.
    Passive,
}

/// Runs scan passes.
pub trait Scanner: Send + Sync {
    /// Scan for `timeout` and report every device seen.
    fn scan(
        &self,
        timeout: Duration,
        mode: ScanMode,
    ) -> impl Future<Output = Result<Vec<ScanResult>, BleError>> + Send;
}
