//! Port definitions: traits that adapters implement.
//!
//! The engine drives BLE hardware through [`BleClient`] and [`Scanner`],
//! obtained from a [`BleBackend`], and hands its output to a
//! [`Dispatcher`]. Converters are resolved by name from a
//! [`ConverterRegistry`] when a device is set up.

pub mod ble_client;
pub mod converter;
pub mod dispatch;
pub mod scanner;

pub use ble_client::{
    BleBackend, BleClient, CharProperty, CharacteristicInfo, DescriptorInfo, Notification,
    NotificationSink, ServiceInfo,
};
pub use converter::{Converter, ConverterRegistry};
pub use dispatch::{ChannelDispatcher, Dispatcher};
pub use scanner::{ScanMode, Scanner};
