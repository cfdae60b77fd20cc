//! Acquisition envelopes: raw data on its way to a converter.

use std::fmt;
use std::sync::Arc;

use blegate_domain::converted::ConvertedData;
use blegate_domain::device::DeviceProfile;
use blegate_domain::item::{AdvertisementItem, CharacteristicItem, DataSource, Section};
use blegate_domain::time::{self, Timestamp};

use crate::ports::Converter;

/// Per-source settings shared by every envelope of one device and source.
pub struct SourceConfig {
    pub data_source: DataSource,
    /// Name the converter was resolved under.
    pub extension: String,
    pub converter: Arc<dyn Converter>,
    /// Opaque hint forwarded to the converter.
    pub report_strategy: Option<serde_json::Value>,
    /// Items decoded from the advertisement payload. Empty for the
    /// characteristic source, whose items travel with their data.
    pub advertisement_items: Vec<AdvertisementItem>,
}

impl SourceConfig {
    /// Characteristic source of `profile`.
    #[must_use]
    pub fn characteristic(profile: &DeviceProfile, converter: Arc<dyn Converter>) -> Self {
        Self {
            data_source: DataSource::Characteristic,
            extension: profile.characteristic_extension.clone(),
            converter,
            report_strategy: profile.report_strategy.clone(),
            advertisement_items: Vec::new(),
        }
    }

    /// Advertisement source of `profile`.
    #[must_use]
    pub fn advertisement(profile: &DeviceProfile, converter: Arc<dyn Converter>) -> Self {
        Self {
            data_source: DataSource::Advertisement,
            extension: profile.advertisement_extension.clone(),
            converter,
            report_strategy: profile.report_strategy.clone(),
            advertisement_items: profile.advertisement_items.clone(),
        }
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("data_source", &self.data_source)
            .field("extension", &self.extension)
            .field("report_strategy", &self.report_strategy)
            .field("advertisement_items", &self.advertisement_items)
            .finish_non_exhaustive()
    }
}

/// A characteristic item together with the bytes acquired for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedItem {
    pub item: CharacteristicItem,
    pub data: Vec<u8>,
}

/// Characteristic data, split by output section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedData {
    pub telemetry: Vec<CollectedItem>,
    pub attributes: Vec<CollectedItem>,
}

impl CollectedData {
    /// File `data` under the item's section.
    pub fn push(&mut self, item: &CharacteristicItem, data: Vec<u8>) {
        let collected = CollectedItem {
            item: item.clone(),
            data,
        };
        match item.section {
            Section::Telemetry => self.telemetry.push(collected),
            Section::Attributes => self.attributes.push(collected),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.telemetry.is_empty() && self.attributes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.telemetry.len() + self.attributes.len()
    }
}

/// The raw data of an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Items read or pushed over a GATT session.
    Characteristics(CollectedData),
    /// One manufacturer data block taken from an advertisement.
    Advertisement(Vec<u8>),
}

/// What the engine hands to the dispatcher. Immutable once built.
#[derive(Debug, Clone)]
pub struct AcquisitionEnvelope {
    device_name: String,
    device_type: String,
    source: Arc<SourceConfig>,
    payload: Payload,
    received_at: Timestamp,
}

impl AcquisitionEnvelope {
    /// Build an envelope stamped with the current time.
    #[must_use]
    pub fn new(
        device_name: impl Into<String>,
        device_type: impl Into<String>,
        source: Arc<SourceConfig>,
        payload: Payload,
    ) -> Self {
        Self {
            device_name: device_name.into(),
            device_type: device_type.into(),
            source,
            payload,
            received_at: time::now(),
        }
    }

    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    #[must_use]
    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    #[must_use]
    pub fn source(&self) -> &SourceConfig {
        &self.source
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// UTC time the data was acquired.
    #[must_use]
    pub fn received_at(&self) -> Timestamp {
        self.received_at
    }

    /// Run the converter this envelope's source was resolved to.
    #[must_use]
    pub fn convert(&self) -> ConvertedData {
        self.source.converter.convert(self)
    }
}
