//! In-memory ports for tests. Every call is recorded.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use blegate_domain::address::MacAddress;
use blegate_domain::converted::ConvertedData;
use blegate_domain::scan::ScanResult;
use tokio::time::Instant;
use uuid::Uuid;

use crate::envelope::{AcquisitionEnvelope, CollectedData, Payload};
use crate::error::{BleError, DispatchError};
use crate::ports::{
    BleBackend, BleClient, Converter, Notification, NotificationSink, ScanMode, Scanner,
    ServiceInfo,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

/// Failure a fake operation can be scripted to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fail {
    NotFound,
    NotSupported,
    Link,
}

impl Fail {
    fn error(self, uuid: Uuid) -> BleError {
        match self {
            Self::NotFound => BleError::CharacteristicNotFound { uuid },
            Self::NotSupported => BleError::NotSupported {
                uuid: Some(uuid),
                reason: "read".to_owned(),
            },
            Self::Link => BleError::link("gatt error 133"),
        }
    }
}

#[derive(Debug, Default)]
pub struct ClientState {
    pub connected: bool,
    /// Connect attempts still to fail; `u32::MAX` fails forever.
    pub connect_failures: u32,
    pub connect_attempts: Vec<Instant>,
    /// How long each connect takes.
    pub connect_delay: Duration,
    pub connects_in_flight: u32,
    pub max_connects_in_flight: u32,
    pub disconnects: u32,
    pub values: HashMap<Uuid, Vec<u8>>,
    pub read_failures: HashMap<Uuid, Fail>,
    /// One-shot failures, consumed by the next read of the UUID.
    pub next_read_failures: HashMap<Uuid, VecDeque<Fail>>,
    pub descriptors: HashMap<u16, Vec<u8>>,
    pub services: Vec<ServiceInfo>,
    pub reads: Vec<(Uuid, Instant)>,
    pub writes: Vec<(Uuid, Vec<u8>, bool)>,
    pub subscriptions: Vec<Uuid>,
    pub list_services_calls: u32,
    /// I/O attempted while no session was open.
    pub io_while_disconnected: u32,
    sinks: Vec<NotificationSink>,
}

/// Scriptable [`BleClient`].
#[derive(Debug, Clone, Default)]
pub struct FakeClient {
    state: Arc<Mutex<ClientState>>,
}

impl FakeClient {
    pub fn state(&self) -> MutexGuard<'_, ClientState> {
        lock(&self.state)
    }

    pub fn with_value(self, uuid: Uuid, value: &[u8]) -> Self {
        self.state().values.insert(uuid, value.to_vec());
        self
    }

    pub fn with_services(self, services: Vec<ServiceInfo>) -> Self {
        self.state().services = services;
        self
    }

    pub fn failing_reads(self, uuid: Uuid, fail: Fail) -> Self {
        self.state().read_failures.insert(uuid, fail);
        self
    }

    pub fn failing_connects(self, count: u32) -> Self {
        self.state().connect_failures = count;
        self
    }

    pub fn fail_next_read(&self, uuid: Uuid, fail: Fail) {
        self.state()
            .next_read_failures
            .entry(uuid)
            .or_default()
            .push_back(fail);
    }

    /// Deliver a push on every live subscription.
    pub fn push(&self, handle: u16, value: &[u8]) {
        for sink in &self.state().sinks {
            let _ = sink.send(Notification {
                handle,
                value: value.to_vec(),
            });
        }
    }

    fn session_io(&self) -> Result<MutexGuard<'_, ClientState>, BleError> {
        let mut state = self.state();
        if state.connected {
            Ok(state)
        } else {
            state.io_while_disconnected += 1;
            Err(BleError::NotConnected)
        }
    }
}

impl BleClient for FakeClient {
    async fn connect(&self, timeout: Duration) -> Result<(), BleError> {
        let delay = {
            let mut state = self.state();
            state.connect_attempts.push(Instant::now());
            state.connects_in_flight += 1;
            state.max_connects_in_flight = state
                .max_connects_in_flight
                .max(state.connects_in_flight);
            state.connect_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        state.connects_in_flight -= 1;
        if state.connect_failures > 0 {
            if state.connect_failures != u32::MAX {
                state.connect_failures -= 1;
            }
            return Err(BleError::Timeout(timeout));
        }
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BleError> {
        let mut state = self.state();
        state.connected = false;
        state.disconnects += 1;
        state.sinks.clear();
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.state().connected
    }

    async fn read_characteristic(&self, uuid: Uuid) -> Result<Vec<u8>, BleError> {
        let mut state = self.session_io()?;
        state.reads.push((uuid, Instant::now()));
        if let Some(fail) = state
            .next_read_failures
            .get_mut(&uuid)
            .and_then(VecDeque::pop_front)
        {
            if fail == Fail::Link {
                state.connected = false;
            }
            return Err(fail.error(uuid));
        }
        if let Some(fail) = state.read_failures.get(&uuid) {
            return Err(fail.error(uuid));
        }
        state
            .values
            .get(&uuid)
            .cloned()
            .ok_or(BleError::CharacteristicNotFound { uuid })
    }

    async fn write_characteristic(
        &self,
        uuid: Uuid,
        value: &[u8],
        with_response: bool,
    ) -> Result<(), BleError> {
        let mut state = self.session_io()?;
        state.writes.push((uuid, value.to_vec(), with_response));
        state.values.insert(uuid, value.to_vec());
        Ok(())
    }

    async fn subscribe(&self, uuid: Uuid, sink: NotificationSink) -> Result<(), BleError> {
        let mut state = self.session_io()?;
        state.subscriptions.push(uuid);
        state.sinks.push(sink);
        Ok(())
    }

    async fn list_services(&self) -> Result<Vec<ServiceInfo>, BleError> {
        let mut state = self.session_io()?;
        state.list_services_calls += 1;
        Ok(state.services.clone())
    }

    async fn read_descriptor(&self, handle: u16) -> Result<Vec<u8>, BleError> {
        let state = self.session_io()?;
        state
            .descriptors
            .get(&handle)
            .cloned()
            .ok_or(BleError::UnknownDescriptor(handle))
    }
}

#[derive(Debug, Default)]
pub struct ScannerState {
    pub results: Vec<ScanResult>,
    pub scans: Vec<(Instant, Duration, ScanMode)>,
    pub fail: bool,
    /// Each scan lasts its full timeout, as a radio scan does.
    pub slow: bool,
}

/// Scriptable [`Scanner`].
#[derive(Debug, Clone, Default)]
pub struct FakeScanner {
    state: Arc<Mutex<ScannerState>>,
}

impl FakeScanner {
    pub fn state(&self) -> MutexGuard<'_, ScannerState> {
        lock(&self.state)
    }

    pub fn with_result(self, result: ScanResult) -> Self {
        self.state().results.push(result);
        self
    }

    pub fn slow(self) -> Self {
        self.state().slow = true;
        self
    }
}

impl Scanner for FakeScanner {
    async fn scan(&self, timeout: Duration, mode: ScanMode) -> Result<Vec<ScanResult>, BleError> {
        let slow = {
            let mut state = self.state();
            state.scans.push((Instant::now(), timeout, mode));
            state.slow
        };
        if slow {
            tokio::time::sleep(timeout).await;
        }

        let state = self.state();
        if state.fail {
            return Err(BleError::AdapterUnavailable);
        }
        Ok(state.results.clone())
    }
}

/// Backend handing out clones of one fake client and scanner.
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    pub client: FakeClient,
    pub scanner: FakeScanner,
    pub addresses: Arc<Mutex<Vec<MacAddress>>>,
}

impl BleBackend for FakeBackend {
    type Client = FakeClient;
    type Scanner = FakeScanner;

    fn client(&self, address: &MacAddress) -> FakeClient {
        lock(&self.addresses).push(*address);
        self.client.clone()
    }

    fn scanner(&self) -> FakeScanner {
        self.scanner.clone()
    }
}

/// Dispatcher keeping every envelope.
#[derive(Debug, Clone, Default)]
pub struct RecordingDispatcher {
    envelopes: Arc<Mutex<Vec<AcquisitionEnvelope>>>,
    reject: Option<DispatchError>,
}

impl RecordingDispatcher {
    /// Records envelopes but reports `err` for each of them.
    pub fn rejecting(err: DispatchError) -> Self {
        Self {
            reject: Some(err),
            ..Self::default()
        }
    }

    pub fn envelopes(&self) -> Vec<AcquisitionEnvelope> {
        lock(&self.envelopes).clone()
    }

    /// Characteristic payloads, in dispatch order.
    pub fn collected(&self) -> Vec<CollectedData> {
        self.envelopes()
            .into_iter()
            .filter_map(|envelope| match envelope.payload() {
                Payload::Characteristics(data) => Some(data.clone()),
                Payload::Advertisement(_) => None,
            })
            .collect()
    }

    /// Advertisement payloads, in dispatch order.
    pub fn advertisements(&self) -> Vec<Vec<u8>> {
        self.envelopes()
            .into_iter()
            .filter_map(|envelope| match envelope.payload() {
                Payload::Advertisement(data) => Some(data.clone()),
                Payload::Characteristics(_) => None,
            })
            .collect()
    }
}

impl crate::ports::Dispatcher for RecordingDispatcher {
    fn dispatch(&self, envelope: AcquisitionEnvelope) -> Result<(), DispatchError> {
        lock(&self.envelopes).push(envelope);
        match &self.reject {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Converter producing empty output.
#[derive(Debug, Default)]
pub struct StubConverter;

impl Converter for StubConverter {
    fn convert(&self, envelope: &AcquisitionEnvelope) -> ConvertedData {
        ConvertedData::new(envelope.device_name(), envelope.device_type())
    }
}
