//! Scan results.

use std::collections::BTreeMap;

use crate::address::MacAddress;

/// One device seen during a scan pass.
///
/// Ephemeral: produced by a scanner, filtered down to the configured
/// address, then dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub address: MacAddress,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    /// Manufacturer-specific data keyed by company identifier.
    pub manufacturer_data: BTreeMap<u16, Vec<u8>>,
}

impl ScanResult {
    /// The first manufacturer data block, i.e. the one with the lowest
    /// company identifier. `None` when the advertisement carries none.
    #[must_use]
    pub fn first_manufacturer_payload(&self) -> Option<&[u8]> {
        self.manufacturer_data
            .first_key_value()
            .map(|(_, data)| data.as_slice())
    }
}
