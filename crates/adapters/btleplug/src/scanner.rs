//! Scan passes over the shared adapter.
//!
//! A pass reports only the devices that advertised during its window. The
//! adapter's peripheral list also remembers devices seen long ago, so it
//! is consulted for names and signal strength of fresh sightings only.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use blegate_app::error::BleError;
use blegate_app::ports::{ScanMode, Scanner};
use blegate_domain::address::MacAddress;
use blegate_domain::scan::ScanResult;
use btleplug::api::{BDAddr, Central as _, CentralEvent, Peripheral as _};
use btleplug::platform::PeripheralId;
use tokio::time::{self, Instant};
use tokio_stream::{Stream, StreamExt as _};

use crate::error::ble_error;
use crate::scan_session::ScanSessions;

/// Build a [`ScanResult`] from the properties btleplug reports.
pub(crate) fn scan_result(
    address: BDAddr,
    name: Option<String>,
    rssi: Option<i16>,
    manufacturer_data: HashMap<u16, Vec<u8>>,
) -> ScanResult {
    ScanResult {
        address: MacAddress::new(address.into_inner()),
        name,
        rssi,
        manufacturer_data: manufacturer_data.into_iter().collect(),
    }
}

/// Devices heard during one scan window, with the manufacturer data they
/// advertised in it.
#[derive(Debug)]
pub(crate) struct Sightings<I> {
    seen: HashMap<I, HashMap<u16, Vec<u8>>>,
}

impl<I> Default for Sightings<I> {
    fn default() -> Self {
        Self {
            seen: HashMap::new(),
        }
    }
}

impl<I: Eq + Hash> Sightings<I> {
    pub(crate) fn seen(&mut self, id: I) {
        self.seen.entry(id).or_default();
    }

    /// Later blocks for the same company replace earlier ones.
    pub(crate) fn advertised(&mut self, id: I, manufacturer_data: HashMap<u16, Vec<u8>>) {
        self.seen.entry(id).or_default().extend(manufacturer_data);
    }

    pub(crate) fn into_inner(self) -> HashMap<I, HashMap<u16, Vec<u8>>> {
        self.seen
    }
}

fn record(sightings: &mut Sightings<PeripheralId>, event: CentralEvent) {
    match event {
        CentralEvent::ManufacturerDataAdvertisement {
            id,
            manufacturer_data,
        } => sightings.advertised(id, manufacturer_data),
        CentralEvent::DeviceDiscovered(id)
        | CentralEvent::DeviceUpdated(id)
        | CentralEvent::ServiceDataAdvertisement { id, .. }
        | CentralEvent::ServicesAdvertisement { id, .. } => sightings.seen(id),
        _ => {}
    }
}

/// Drain `events` until `deadline`.
async fn listen<S>(events: &mut S, deadline: Instant) -> Sightings<PeripheralId>
where
    S: Stream<Item = CentralEvent> + Unpin,
{
    let mut sightings = Sightings::default();
    loop {
        match time::timeout_at(deadline, events.next()).await {
            Ok(Some(event)) => record(&mut sightings, event),
            Ok(None) | Err(_) => break,
        }
    }
    sightings
}

/// [`Scanner`] over one host adapter.
///
/// btleplug always scans actively; a passive request is served the same
/// way.
#[derive(Clone)]
pub struct BtleplugScanner {
    sessions: Arc<ScanSessions>,
}

impl std::fmt::Debug for BtleplugScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleplugScanner").finish_non_exhaustive()
    }
}

impl BtleplugScanner {
    pub(crate) const fn new(sessions: Arc<ScanSessions>) -> Self {
        Self { sessions }
    }
}

impl Scanner for BtleplugScanner {
    async fn scan(&self, timeout: Duration, mode: ScanMode) -> Result<Vec<ScanResult>, BleError> {
        if mode == ScanMode::Passive {
            tracing::trace!("passive scanning unavailable, scanning actively");
        }

        let adapter = self.sessions.adapter();
        let mut events = adapter.events().await.map_err(|err| ble_error(err, None))?;
        self.sessions.begin().await?;
        let sightings = listen(&mut events, Instant::now() + timeout).await;
        self.sessions.end().await;

        let mut results = Vec::new();
        for (id, advertised) in sightings.into_inner() {
            let peripheral = match adapter.peripheral(&id).await {
                Ok(peripheral) => peripheral,
                Err(err) => {
                    tracing::trace!(%err, "sighted peripheral vanished");
                    continue;
                }
            };
            match peripheral.properties().await {
                Ok(Some(props)) => {
                    let mut manufacturer_data = props.manufacturer_data;
                    manufacturer_data.extend(advertised);
                    results.push(scan_result(
                        props.address,
                        props.local_name,
                        props.rssi,
                        manufacturer_data,
                    ));
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::trace!(address = %peripheral.address(), %err, "no properties");
                }
            }
        }
        tracing::debug!(seen = results.len(), "scan pass complete");
        Ok(results)
    }
}
