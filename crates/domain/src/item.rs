//! Configured data items and where their bytes come from.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a characteristic-sourced item is acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Polled with a GATT read on every poll cycle.
    Read,
    /// Pushed by the peripheral after a one-time subscription.
    Notify,
}

/// Where an item's raw bytes come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// A GATT characteristic on a connected device.
    #[default]
    Characteristic,
    /// The manufacturer data of an advertisement.
    Advertisement,
}

/// Which section of the converted output an item lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    /// Time-series telemetry.
    Telemetry,
    /// Device attributes.
    Attributes,
}

impl Section {
    /// Both sections, telemetry first.
    pub const ALL: [Self; 2] = [Self::Telemetry, Self::Attributes];

    /// Configuration name of the section.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Telemetry => "telemetry",
            Self::Attributes => "attributes",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated characteristic-sourced item.
///
/// The `uuid` is the item's stable identity. The `handle` is resolved at
/// runtime the first time the characteristic is found on a connected
/// device and is only valid for that connection session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicItem {
    pub section: Section,
    pub uuid: Uuid,
    pub method: Method,
    pub key: String,
    /// Decode hint for the converter.
    pub value_expression: Option<String>,
    pub handle: Option<u16>,
}

impl CharacteristicItem {
    /// Forget the session-scoped handle.
    pub fn invalidate_handle(&mut self) {
        self.handle = None;
    }
}

/// A validated advertisement-sourced item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementItem {
    pub section: Section,
    pub key: String,
    /// Decode hint for the converter.
    pub value_expression: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_deserialize_lowercase_method() {
        let method: Method = serde_json::from_str("\"notify\"").unwrap();
        assert_eq!(method, Method::Notify);
    }

    #[test]
    fn should_default_to_characteristic_source() {
        assert_eq!(DataSource::default(), DataSource::Characteristic);
    }

    #[test]
    fn should_display_section_name() {
        assert_eq!(Section::Attributes.to_string(), "attributes");
    }

    #[test]
    fn should_invalidate_handle() {
        let mut item = CharacteristicItem {
            section: Section::Telemetry,
            uuid: crate::gatt::from_short(0xFFE1),
            method: Method::Notify,
            key: "temperature".to_owned(),
            value_expression: None,
            handle: Some(0x2A),
        };
        item.invalidate_handle();
        assert_eq!(item.handle, None);
    }
}
