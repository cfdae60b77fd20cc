//! GATT client sessions over btleplug.
//!
//! btleplug addresses characteristics by UUID and has no notion of
//! attribute handles, so a [`GattTree`] numbers the discovered attributes
//! once per connection. Those handles are what the app layer sees; they are
//! dropped with the session.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use blegate_app::error::BleError;
use blegate_app::ports::{
    BleClient, CharProperty, CharacteristicInfo, DescriptorInfo, Notification, NotificationSink,
    ServiceInfo,
};
use blegate_domain::address::MacAddress;
use btleplug::api::{
    BDAddr, CharPropFlags, Central as _, Characteristic, Descriptor, Peripheral as _, Service,
    ValueNotification, WriteType,
};
use btleplug::platform::Peripheral;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_stream::{Stream, StreamExt as _};
use uuid::Uuid;

use crate::error::ble_error;
use crate::scan_session::ScanSessions;

/// Property flags in the order they are reported.
const PROPERTIES: [(CharPropFlags, CharProperty); 8] = [
    (CharPropFlags::BROADCAST, CharProperty::Broadcast),
    (CharPropFlags::READ, CharProperty::Read),
    (
        CharPropFlags::WRITE_WITHOUT_RESPONSE,
        CharProperty::WriteWithoutResponse,
    ),
    (CharPropFlags::WRITE, CharProperty::Write),
    (CharPropFlags::NOTIFY, CharProperty::Notify),
    (CharPropFlags::INDICATE, CharProperty::Indicate),
    (
        CharPropFlags::AUTHENTICATED_SIGNED_WRITES,
        CharProperty::AuthenticatedSignedWrites,
    ),
    (
        CharPropFlags::EXTENDED_PROPERTIES,
        CharProperty::ExtendedProperties,
    ),
];

pub(crate) fn properties(flags: CharPropFlags) -> Vec<CharProperty> {
    PROPERTIES
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .map(|(_, property)| *property)
        .collect()
}

/// The service tree of one connection with session handles assigned.
///
/// Handles are numbered from 1 in discovery order: each service, then its
/// characteristics, each followed by its descriptors.
#[derive(Debug, Default)]
pub(crate) struct GattTree {
    services: Vec<ServiceInfo>,
    characteristics: HashMap<Uuid, (u16, Characteristic)>,
    descriptors: HashMap<u16, Descriptor>,
}

impl GattTree {
    pub(crate) fn build(services: &BTreeSet<Service>) -> Self {
        let mut tree = Self::default();
        let mut next: u16 = 0;
        let mut allocate = || {
            next = next.saturating_add(1);
            next
        };

        for service in services {
            allocate();
            let mut characteristics = Vec::with_capacity(service.characteristics.len());
            for characteristic in &service.characteristics {
                let handle = allocate();
                let descriptors = characteristic
                    .descriptors
                    .iter()
                    .map(|descriptor| {
                        let handle = allocate();
                        tree.descriptors.insert(handle, descriptor.clone());
                        DescriptorInfo {
                            uuid: descriptor.uuid,
                            handle,
                        }
                    })
                    .collect();
                // A UUID repeated across services resolves to its first occurrence.
                tree.characteristics
                    .entry(characteristic.uuid)
                    .or_insert_with(|| (handle, characteristic.clone()));
                characteristics.push(CharacteristicInfo {
                    uuid: characteristic.uuid,
                    handle,
                    properties: properties(characteristic.properties),
                    descriptors,
                });
            }
            tree.services.push(ServiceInfo {
                uuid: service.uuid,
                characteristics,
            });
        }
        tree
    }

    fn characteristic(&self, uuid: Uuid) -> Result<&Characteristic, BleError> {
        self.characteristics
            .get(&uuid)
            .map(|(_, characteristic)| characteristic)
            .ok_or(BleError::CharacteristicNotFound { uuid })
    }

    fn handles(&self) -> HashMap<Uuid, u16> {
        self.characteristics
            .iter()
            .map(|(uuid, (handle, _))| (*uuid, *handle))
            .collect()
    }
}

fn require(
    characteristic: &Characteristic,
    any_of: CharPropFlags,
    operation: &str,
) -> Result<(), BleError> {
    if characteristic.properties.intersects(any_of) {
        Ok(())
    } else {
        Err(BleError::NotSupported {
            uuid: Some(characteristic.uuid),
            reason: format!("characteristic does not support {operation}"),
        })
    }
}

struct Connection {
    peripheral: Peripheral,
    tree: GattTree,
    forwarder: Option<JoinHandle<()>>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

/// [`BleClient`] bound to one peripheral address.
pub struct BtleplugClient {
    sessions: Arc<ScanSessions>,
    address: BDAddr,
    discovery_poll: Duration,
    session: Mutex<Option<Connection>>,
}

impl std::fmt::Debug for BtleplugClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleplugClient")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl BtleplugClient {
    pub(crate) fn new(
        sessions: Arc<ScanSessions>,
        address: &MacAddress,
        discovery_poll: Duration,
    ) -> Self {
        Self {
            sessions,
            address: BDAddr::from(address.octets()),
            discovery_poll,
            session: Mutex::new(None),
        }
    }

    async fn known_peripheral(&self) -> Result<Option<Peripheral>, BleError> {
        let peripherals = self
            .sessions
            .adapter()
            .peripherals()
            .await
            .map_err(|err| ble_error(err, None))?;
        Ok(peripherals
            .into_iter()
            .find(|peripheral| peripheral.address() == self.address))
    }

    /// Look the peripheral up, scanning until `deadline` if the adapter
    /// has not seen it yet.
    async fn find_peripheral(&self, deadline: Instant) -> Result<Peripheral, BleError> {
        if let Some(peripheral) = self.known_peripheral().await? {
            return Ok(peripheral);
        }

        tracing::debug!(address = %self.address, "peripheral unknown, scanning for it");
        self.sessions.begin().await?;

        let found = loop {
            match self.known_peripheral().await {
                Ok(Some(peripheral)) => break Ok(Some(peripheral)),
                Ok(None) if Instant::now() + self.discovery_poll < deadline => {
                    time::sleep(self.discovery_poll).await;
                }
                Ok(None) => break Ok(None),
                Err(err) => break Err(err),
            }
        };

        self.sessions.end().await;
        found?.ok_or(BleError::DeviceNotFound)
    }

    async fn open(&self, timeout: Duration) -> Result<Connection, BleError> {
        let deadline = Instant::now() + timeout;
        let peripheral = self.find_peripheral(deadline).await?;

        time::timeout_at(deadline, peripheral.connect())
            .await
            .map_err(|_| BleError::Timeout(timeout))?
            .map_err(|err| ble_error(err, None))?;

        let discovered = match time::timeout_at(deadline, peripheral.discover_services()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(ble_error(err, None)),
            Err(_) => Err(BleError::Timeout(timeout)),
        };
        if let Err(err) = discovered {
            if let Err(disconnect) = peripheral.disconnect().await {
                tracing::debug!(err = %disconnect, "disconnect after failed discovery");
            }
            return Err(err);
        }

        let tree = GattTree::build(&peripheral.services());
        Ok(Connection {
            peripheral,
            tree,
            forwarder: None,
        })
    }
}

/// Relay pushes of the session to `sink` until either side goes away.
async fn forward<S>(mut stream: S, handles: HashMap<Uuid, u16>, sink: NotificationSink)
where
    S: Stream<Item = ValueNotification> + Unpin,
{
    while let Some(notification) = stream.next().await {
        let Some(&handle) = handles.get(&notification.uuid) else {
            tracing::trace!(uuid = %notification.uuid, "push from unknown characteristic");
            continue;
        };
        let push = Notification {
            handle,
            value: notification.value,
        };
        if sink.send(push).is_err() {
            break;
        }
    }
}

impl BleClient for BtleplugClient {
    async fn connect(&self, timeout: Duration) -> Result<(), BleError> {
        let mut session = self.session.lock().await;
        if let Some(stale) = session.take()
            && let Err(err) = stale.peripheral.disconnect().await
        {
            tracing::debug!(%err, "closing stale session");
        }
        *session = Some(self.open(timeout).await?);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BleError> {
        let Some(connection) = self.session.lock().await.take() else {
            return Ok(());
        };
        match connection.peripheral.disconnect().await {
            Ok(()) | Err(btleplug::Error::NotConnected) => Ok(()),
            Err(err) => Err(ble_error(err, None)),
        }
    }

    async fn is_connected(&self) -> bool {
        let session = self.session.lock().await;
        let Some(connection) = session.as_ref() else {
            return false;
        };
        connection.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn read_characteristic(&self, uuid: Uuid) -> Result<Vec<u8>, BleError> {
        let session = self.session.lock().await;
        let connection = session.as_ref().ok_or(BleError::NotConnected)?;
        let characteristic = connection.tree.characteristic(uuid)?;
        require(characteristic, CharPropFlags::READ, "read")?;
        connection
            .peripheral
            .read(characteristic)
            .await
            .map_err(|err| ble_error(err, Some(uuid)))
    }

    async fn write_characteristic(
        &self,
        uuid: Uuid,
        value: &[u8],
        with_response: bool,
    ) -> Result<(), BleError> {
        let session = self.session.lock().await;
        let connection = session.as_ref().ok_or(BleError::NotConnected)?;
        let characteristic = connection.tree.characteristic(uuid)?;
        let (flag, write_type) = if with_response {
            (CharPropFlags::WRITE, WriteType::WithResponse)
        } else {
            (
                CharPropFlags::WRITE_WITHOUT_RESPONSE,
                WriteType::WithoutResponse,
            )
        };
        require(characteristic, flag, "this kind of write")?;
        connection
            .peripheral
            .write(characteristic, value, write_type)
            .await
            .map_err(|err| ble_error(err, Some(uuid)))
    }

    async fn subscribe(&self, uuid: Uuid, sink: NotificationSink) -> Result<(), BleError> {
        let mut session = self.session.lock().await;
        let connection = session.as_mut().ok_or(BleError::NotConnected)?;
        let characteristic = connection.tree.characteristic(uuid)?;
        require(
            characteristic,
            CharPropFlags::NOTIFY | CharPropFlags::INDICATE,
            "notifications",
        )?;
        connection
            .peripheral
            .subscribe(characteristic)
            .await
            .map_err(|err| ble_error(err, Some(uuid)))?;

        if connection.forwarder.is_none() {
            let stream = connection
                .peripheral
                .notifications()
                .await
                .map_err(|err| ble_error(err, Some(uuid)))?;
            let handles = connection.tree.handles();
            connection.forwarder = Some(tokio::spawn(forward(stream, handles, sink)));
        }
        Ok(())
    }

    async fn list_services(&self) -> Result<Vec<ServiceInfo>, BleError> {
        let session = self.session.lock().await;
        let connection = session.as_ref().ok_or(BleError::NotConnected)?;
        Ok(connection.tree.services.clone())
    }

    async fn read_descriptor(&self, handle: u16) -> Result<Vec<u8>, BleError> {
        let session = self.session.lock().await;
        let connection = session.as_ref().ok_or(BleError::NotConnected)?;
        let descriptor = connection
            .tree
            .descriptors
            .get(&handle)
            .ok_or(BleError::UnknownDescriptor(handle))?;
        connection
            .peripheral
            .read_descriptor(descriptor)
            .await
            .map_err(|err| ble_error(err, Some(descriptor.characteristic_uuid)))
    }
}

#[cfg(test)]
mod tests {
    use blegate_domain::gatt;
    use tokio::sync::mpsc;

    use super::*;

    const SERVICE: Uuid = gatt::from_short(0xFFE0);
    const FFE1: Uuid = gatt::from_short(0xFFE1);
    const FFE4: Uuid = gatt::from_short(0xFFE4);
    const CCCD: Uuid = gatt::from_short(0x2902);

    fn characteristic(uuid: Uuid, properties: CharPropFlags, cccd: bool) -> Characteristic {
        let descriptors = if cccd {
            BTreeSet::from([Descriptor {
                uuid: CCCD,
                service_uuid: SERVICE,
                characteristic_uuid: uuid,
            }])
        } else {
            BTreeSet::new()
        };
        Characteristic {
            uuid,
            service_uuid: SERVICE,
            properties,
            descriptors,
        }
    }

    fn services() -> BTreeSet<Service> {
        BTreeSet::from([Service {
            uuid: SERVICE,
            primary: true,
            characteristics: BTreeSet::from([
                characteristic(FFE1, CharPropFlags::READ, false),
                characteristic(FFE4, CharPropFlags::NOTIFY, true),
            ]),
        }])
    }

    #[test]
    fn should_map_property_flags_in_order() {
        let flags = CharPropFlags::NOTIFY | CharPropFlags::READ | CharPropFlags::WRITE;
        assert_eq!(
            properties(flags),
            vec![CharProperty::Read, CharProperty::Write, CharProperty::Notify]
        );
        assert!(properties(CharPropFlags::empty()).is_empty());
    }

    #[test]
    fn should_number_attributes_in_discovery_order() {
        let tree = GattTree::build(&services());

        assert_eq!(tree.services.len(), 1);
        let characteristics = &tree.services[0].characteristics;
        assert_eq!(characteristics[0].uuid, FFE1);
        assert_eq!(characteristics[0].handle, 2);
        assert_eq!(characteristics[1].uuid, FFE4);
        assert_eq!(characteristics[1].handle, 3);
        assert_eq!(
            characteristics[1].descriptors,
            vec![DescriptorInfo {
                uuid: CCCD,
                handle: 4
            }]
        );
        assert!(characteristics[1].has(CharProperty::Notify));
    }

    #[test]
    fn should_resolve_characteristics_and_descriptors() {
        let tree = GattTree::build(&services());

        assert_eq!(tree.characteristic(FFE4).unwrap().uuid, FFE4);
        assert!(matches!(
            tree.characteristic(gatt::from_short(0xFFF0)),
            Err(BleError::CharacteristicNotFound { .. })
        ));
        assert_eq!(tree.descriptors[&4].characteristic_uuid, FFE4);
        assert_eq!(tree.handles()[&FFE1], 2);
    }

    #[test]
    fn should_refuse_operations_the_characteristic_lacks() {
        let readable = characteristic(FFE1, CharPropFlags::READ, false);

        assert!(require(&readable, CharPropFlags::READ, "read").is_ok());
        let err = require(&readable, CharPropFlags::WRITE, "write").unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn should_forward_pushes_with_session_handles() {
        let stream = tokio_stream::iter(vec![
            ValueNotification {
                uuid: FFE4,
                value: vec![0x01],
            },
            ValueNotification {
                uuid: gatt::from_short(0xFFF0),
                value: vec![0x02],
            },
        ]);
        let (sink, mut pushes) = mpsc::unbounded_channel();

        forward(stream, HashMap::from([(FFE4, 3)]), sink).await;

        assert_eq!(
            pushes.recv().await,
            Some(Notification {
                handle: 3,
                value: vec![0x01]
            })
        );
        assert_eq!(pushes.recv().await, None);
    }
}
