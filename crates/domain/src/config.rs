//! Device configuration schema, as produced by the gateway's config loader.
//!
//! Field names follow the loader's camelCase schema. Every optional field
//! has a default so a device can be declared with just a name, an address
//! and its items. Semantic validation happens when the configuration is
//! turned into a [`DeviceProfile`](crate::device::DeviceProfile).

use serde::Deserialize;

use crate::item::{DataSource, Method};

/// Default poll period, in milliseconds.
pub const DEFAULT_POLL_PERIOD_MS: u64 = 5_000;
/// Default connect and scan timeout, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
/// Default number of connect attempts before the extended pause.
pub const DEFAULT_CONNECT_RETRY: u32 = 5;

/// Configuration of one BLE device.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeviceConfig {
    /// Device name reported downstream.
    pub name: String,
    /// Bluetooth address, `AA:BB:CC:DD:EE:FF`.
    #[serde(rename = "MACAddress")]
    pub mac_address: String,
    /// Device type reported downstream.
    pub device_type: String,
    /// Minimum interval between poll cycles, in milliseconds.
    pub poll_period: u64,
    /// Connect and scan timeout, in milliseconds.
    pub timeout: u64,
    /// Failed attempts after which the extended pause kicks in.
    pub connect_retry: u32,
    /// Pause between connect attempts, in seconds.
    pub connect_retry_in_seconds: u64,
    /// Extended pause after every `connect_retry` failures, in seconds.
    pub wait_after_connect_retries: u64,
    /// Log the service map after the first successful connection.
    pub show_map: bool,
    /// Payload encoding hint used to pick default converters.
    #[serde(rename = "type")]
    pub payload_type: Option<PayloadType>,
    /// Converter name overriding both defaults.
    pub extension: Option<String>,
    /// Opaque report-strategy hint forwarded to the converter.
    pub report_strategy: Option<serde_json::Value>,
    /// Telemetry items.
    pub telemetry: Vec<ItemConfig>,
    /// Attribute items.
    pub attributes: Vec<ItemConfig>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            mac_address: String::new(),
            device_type: "default".to_owned(),
            poll_period: DEFAULT_POLL_PERIOD_MS,
            timeout: DEFAULT_TIMEOUT_MS,
            connect_retry: DEFAULT_CONNECT_RETRY,
            connect_retry_in_seconds: 0,
            wait_after_connect_retries: 0,
            show_map: false,
            payload_type: None,
            extension: None,
            report_strategy: None,
            telemetry: Vec::new(),
            attributes: Vec::new(),
        }
    }
}

impl DeviceConfig {
    /// Converter name for characteristic-sourced data.
    ///
    /// `extension` wins; otherwise the bytes converter, unless the payload
    /// type is explicitly `hex`.
    #[must_use]
    pub fn characteristic_extension<'a>(&'a self, defaults: &'a ConverterDefaults) -> &'a str {
        self.extension.as_deref().unwrap_or(match self.payload_type {
            Some(PayloadType::Hex) => defaults.hex.as_str(),
            Some(PayloadType::Bytes) | None => defaults.bytes.as_str(),
        })
    }

    /// Converter name for advertisement-sourced data.
    ///
    /// `extension` wins; otherwise the hex converter, unless the payload
    /// type is explicitly `bytes`.
    #[must_use]
    pub fn advertisement_extension<'a>(&'a self, defaults: &'a ConverterDefaults) -> &'a str {
        self.extension.as_deref().unwrap_or(match self.payload_type {
            Some(PayloadType::Bytes) => defaults.bytes.as_str(),
            Some(PayloadType::Hex) | None => defaults.hex.as_str(),
        })
    }
}

/// Raw configuration of one telemetry or attribute item.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ItemConfig {
    /// Output key.
    pub key: String,
    /// Acquisition method; required for characteristic-sourced items.
    pub method: Option<Method>,
    /// Characteristic UUID; required for characteristic-sourced items.
    #[serde(rename = "characteristicUUID")]
    pub characteristic_uuid: Option<String>,
    /// Where the bytes come from.
    pub data_source_type: DataSource,
    /// Decode hint for the converter.
    pub value_expression: Option<String>,
}

/// Payload encoding hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadType {
    Bytes,
    Hex,
}

/// Converter names used when a device does not name one explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterDefaults {
    /// Converter for raw byte payloads.
    pub bytes: String,
    /// Converter for hex-rendered payloads.
    pub hex: String,
}

impl Default for ConverterDefaults {
    fn default() -> Self {
        Self {
            bytes: "BytesBLEUplinkConverter".to_owned(),
            hex: "HexBytesBLEUplinkConverter".to_owned(),
        }
    }
}
