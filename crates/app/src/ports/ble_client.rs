//! BLE client port: GATT access to one peripheral.
//!
//! A client is bound to a single device address and is driven from exactly
//! one device worker. Implementations are not required to support
//! concurrent calls; the worker never issues two at once.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use blegate_domain::address::MacAddress;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::BleError;
use crate::ports::Scanner;

/// A value pushed by the peripheral on a subscribed characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Session handle of the source characteristic.
    pub handle: u16,
    pub value: Vec<u8>,
}

/// Where a client delivers notifications for a session.
pub type NotificationSink = mpsc::UnboundedSender<Notification>;

/// GATT characteristic property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharProperty {
    Broadcast,
    Read,
    WriteWithoutResponse,
    Write,
    Notify,
    Indicate,
    AuthenticatedSignedWrites,
    ExtendedProperties,
}

impl fmt::Display for CharProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Broadcast => "broadcast",
            Self::Read => "read",
            Self::WriteWithoutResponse => "write-without-response",
            Self::Write => "write",
            Self::Notify => "notify",
            Self::Indicate => "indicate",
            Self::AuthenticatedSignedWrites => "authenticated-signed-writes",
            Self::ExtendedProperties => "extended-properties",
        };
        f.write_str(s)
    }
}

/// A descriptor of a characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorInfo {
    pub uuid: Uuid,
    pub handle: u16,
}

/// A characteristic as discovered on the connected device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicInfo {
    pub uuid: Uuid,
    /// Session handle; only valid until the next disconnect.
    pub handle: u16,
    pub properties: Vec<CharProperty>,
    pub descriptors: Vec<DescriptorInfo>,
}

impl CharacteristicInfo {
    #[must_use]
    pub fn has(&self, property: CharProperty) -> bool {
        self.properties.contains(&property)
    }
}

/// A primary service and its characteristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicInfo>,
}

/// GATT access to one peripheral.
pub trait BleClient: Send + Sync {
    /// Open a session, giving up after `timeout`.
    fn connect(&self, timeout: Duration) -> impl Future<Output = Result<(), BleError>> + Send;

    /// Close the session. Closing an already closed session is not an error.
    fn disconnect(&self) -> impl Future<Output = Result<(), BleError>> + Send;

    fn is_connected(&self) -> impl Future<Output = bool> + Send;

    fn read_characteristic(
        &self,
        uuid: Uuid,
    ) -> impl Future<Output = Result<Vec<u8>, BleError>> + Send;

    /// Write `value`; `with_response` asks the peripheral to acknowledge.
    fn write_characteristic(
        &self,
        uuid: Uuid,
        value: &[u8],
        with_response: bool,
    ) -> impl Future<Output = Result<(), BleError>> + Send;

    /// Enable notifications on `uuid`. Pushes are delivered to `sink`
    /// until the session ends.
    fn subscribe(
        &self,
        uuid: Uuid,
        sink: NotificationSink,
    ) -> impl Future<Output = Result<(), BleError>> + Send;

    /// The service tree of the connected device, with session handles.
    fn list_services(&self) -> impl Future<Output = Result<Vec<ServiceInfo>, BleError>> + Send;

    fn read_descriptor(&self, handle: u16)
    -> impl Future<Output = Result<Vec<u8>, BleError>> + Send;
}

/// Factory for clients and scanners of one BLE stack.
pub trait BleBackend: Send + Sync + 'static {
    type Client: BleClient + 'static;
    type Scanner: Scanner + 'static;

    /// A client bound to `address`. Creating it does not connect.
    fn client(&self, address: &MacAddress) -> Self::Client;

    /// A scanner usable by one worker.
    fn scanner(&self) -> Self::Scanner;
}
