//! Validated device definitions that device workers are built from.

use std::time::Duration;

use crate::address::MacAddress;
use crate::config::{ConverterDefaults, DeviceConfig, ItemConfig};
use crate::error::ConfigError;
use crate::gatt;
use crate::item::{AdvertisementItem, CharacteristicItem, DataSource, Section};

/// Timing parameters of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Minimum interval between two poll cycles (or scan passes).
    pub poll_period: Duration,
    /// Connect timeout; also the duration of one scan pass.
    pub timeout: Duration,
    /// Failed attempts after which the extended pause kicks in.
    pub connect_retry: u32,
    /// Pause between two connect attempts.
    pub connect_retry_interval: Duration,
    /// Extended pause after every `connect_retry` failures.
    pub wait_after_connect_retries: Duration,
}

/// A device definition that passed validation.
///
/// Items are partitioned by source: characteristic-sourced items are
/// acquired over a GATT connection, advertisement-sourced items from the
/// manufacturer data of scan results.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProfile {
    pub name: String,
    pub address: MacAddress,
    pub device_type: String,
    pub timing: Timing,
    pub show_map: bool,
    pub characteristic_items: Vec<CharacteristicItem>,
    pub advertisement_items: Vec<AdvertisementItem>,
    /// Converter name for characteristic-sourced data.
    pub characteristic_extension: String,
    /// Converter name for advertisement-sourced data.
    pub advertisement_extension: String,
    pub report_strategy: Option<serde_json::Value>,
}

impl DeviceProfile {
    /// Validate a raw configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the name is empty, the address is
    /// malformed, the poll period is zero, or an item lacks a key, a
    /// method or a valid characteristic UUID.
    pub fn from_config(
        config: &DeviceConfig,
        defaults: &ConverterDefaults,
    ) -> Result<Self, ConfigError> {
        let name = config.name.trim();
        if name.is_empty() {
            return Err(ConfigError::EmptyName);
        }

        let address =
            config
                .mac_address
                .parse()
                .map_err(|source| ConfigError::InvalidAddress {
                    device: name.to_owned(),
                    source,
                })?;

        if config.poll_period == 0 {
            return Err(ConfigError::ZeroPollPeriod {
                device: name.to_owned(),
            });
        }

        let mut characteristic_items = Vec::new();
        let mut advertisement_items = Vec::new();

        for section in Section::ALL {
            let items = match section {
                Section::Telemetry => &config.telemetry,
                Section::Attributes => &config.attributes,
            };
            for (index, item) in items.iter().enumerate() {
                if item.key.trim().is_empty() {
                    return Err(ConfigError::EmptyKey {
                        device: name.to_owned(),
                        section: section.as_str(),
                        index,
                    });
                }
                match item.data_source_type {
                    DataSource::Characteristic => {
                        characteristic_items.push(characteristic_item(name, section, item)?);
                    }
                    DataSource::Advertisement => advertisement_items.push(AdvertisementItem {
                        section,
                        key: item.key.clone(),
                        value_expression: item.value_expression.clone(),
                    }),
                }
            }
        }

        Ok(Self {
            name: name.to_owned(),
            address,
            device_type: config.device_type.clone(),
            timing: Timing {
                poll_period: Duration::from_millis(config.poll_period),
                timeout: Duration::from_millis(config.timeout),
                connect_retry: config.connect_retry,
                connect_retry_interval: Duration::from_secs(config.connect_retry_in_seconds),
                wait_after_connect_retries: Duration::from_secs(config.wait_after_connect_retries),
            },
            show_map: config.show_map,
            characteristic_items,
            advertisement_items,
            characteristic_extension: config.characteristic_extension(defaults).to_owned(),
            advertisement_extension: config.advertisement_extension(defaults).to_owned(),
            report_strategy: config.report_strategy.clone(),
        })
    }

    /// A device with no characteristic-sourced items is acquired by
    /// scanning only and never connected to.
    #[must_use]
    pub fn is_advertisement_only(&self) -> bool {
        self.characteristic_items.is_empty()
    }
}

fn characteristic_item(
    device: &str,
    section: Section,
    item: &ItemConfig,
) -> Result<CharacteristicItem, ConfigError> {
    let method = item.method.ok_or_else(|| ConfigError::MissingMethod {
        device: device.to_owned(),
        key: item.key.clone(),
    })?;

    let raw = item
        .characteristic_uuid
        .as_deref()
        .ok_or_else(|| ConfigError::MissingUuid {
            device: device.to_owned(),
            key: item.key.clone(),
        })?;

    let uuid = gatt::parse_uuid(raw).ok_or_else(|| ConfigError::InvalidUuid {
        device: device.to_owned(),
        key: item.key.clone(),
        value: raw.to_owned(),
    })?;

    Ok(CharacteristicItem {
        section,
        uuid,
        method,
        key: item.key.clone(),
        value_expression: item.value_expression.clone(),
        handle: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Method;

    fn item(key: &str, method: Option<Method>, uuid: Option<&str>) -> ItemConfig {
        ItemConfig {
            key: key.to_owned(),
            method,
            characteristic_uuid: uuid.map(ToOwned::to_owned),
            ..ItemConfig::default()
        }
    }

    fn base_config() -> DeviceConfig {
        DeviceConfig {
            name: "Thermometer".to_owned(),
            mac_address: "a4:c1:38:5b:0e:df".to_owned(),
            ..DeviceConfig::default()
        }
    }

    #[test]
    fn should_build_profile_with_defaults() {
        let mut config = base_config();
        config
            .telemetry
            .push(item("battery", Some(Method::Read), Some("FFE1")));

        let profile = DeviceProfile::from_config(&config, &ConverterDefaults::default()).unwrap();

        assert_eq!(profile.name, "Thermometer");
        assert_eq!(profile.address.to_string(), "A4:C1:38:5B:0E:DF");
        assert_eq!(profile.timing.poll_period, Duration::from_secs(5));
        assert_eq!(profile.timing.timeout, Duration::from_secs(10));
        assert_eq!(profile.timing.connect_retry, 5);
        assert_eq!(profile.timing.connect_retry_interval, Duration::ZERO);
        assert_eq!(profile.characteristic_extension, "BytesBLEUplinkConverter");
        assert_eq!(profile.advertisement_extension, "HexBytesBLEUplinkConverter");

        let battery = &profile.characteristic_items[0];
        assert_eq!(battery.uuid, gatt::from_short(0xFFE1));
        assert_eq!(battery.section, Section::Telemetry);
        assert_eq!(battery.handle, None);
        assert!(!profile.is_advertisement_only());
    }

    #[test]
    fn should_partition_items_by_source() {
        let mut config = base_config();
        config
            .telemetry
            .push(item("temperature", Some(Method::Notify), Some("FFE4")));
        config.telemetry.push(ItemConfig {
            key: "rssi_payload".to_owned(),
            data_source_type: DataSource::Advertisement,
            ..ItemConfig::default()
        });
        config
            .attributes
            .push(item("model", Some(Method::Read), Some("2A24")));

        let profile = DeviceProfile::from_config(&config, &ConverterDefaults::default()).unwrap();

        assert_eq!(profile.characteristic_items.len(), 2);
        assert_eq!(profile.characteristic_items[1].section, Section::Attributes);
        assert_eq!(profile.advertisement_items.len(), 1);
        assert_eq!(profile.advertisement_items[0].key, "rssi_payload");
    }

    #[test]
    fn should_be_advertisement_only_without_characteristic_items() {
        let profile =
            DeviceProfile::from_config(&base_config(), &ConverterDefaults::default()).unwrap();
        assert!(profile.is_advertisement_only());
    }

    #[test]
    fn should_reject_empty_name() {
        let config = DeviceConfig {
            name: "  ".to_owned(),
            ..base_config()
        };
        let err = DeviceProfile::from_config(&config, &ConverterDefaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyName));
    }

    #[test]
    fn should_reject_malformed_address() {
        let config = DeviceConfig {
            mac_address: "A4C1385B0EDF".to_owned(),
            ..base_config()
        };
        let err = DeviceProfile::from_config(&config, &ConverterDefaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress { .. }));
    }

    #[test]
    fn should_reject_zero_poll_period() {
        let config = DeviceConfig {
            poll_period: 0,
            ..base_config()
        };
        let err = DeviceProfile::from_config(&config, &ConverterDefaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroPollPeriod { .. }));
    }

    #[test]
    fn should_reject_item_without_key() {
        let mut config = base_config();
        config
            .attributes
            .push(item(" ", Some(Method::Read), Some("FFE1")));
        let err = DeviceProfile::from_config(&config, &ConverterDefaults::default()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::EmptyKey {
                section: "attributes",
                index: 0,
                ..
            }
        ));
    }

    #[test]
    fn should_reject_characteristic_item_without_method() {
        let mut config = base_config();
        config.telemetry.push(item("battery", None, Some("FFE1")));
        let err = DeviceProfile::from_config(&config, &ConverterDefaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingMethod { key, .. } if key == "battery"));
    }

    #[test]
    fn should_reject_characteristic_item_without_uuid() {
        let mut config = base_config();
        config
            .telemetry
            .push(item("battery", Some(Method::Read), None));
        let err = DeviceProfile::from_config(&config, &ConverterDefaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingUuid { .. }));
    }

    #[test]
    fn should_reject_invalid_uuid() {
        let mut config = base_config();
        config
            .telemetry
            .push(item("battery", Some(Method::Read), Some("XYZ")));
        let err = DeviceProfile::from_config(&config, &ConverterDefaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUuid { value, .. } if value == "XYZ"));
    }

    #[test]
    fn should_accept_advertisement_item_without_method() {
        let mut config = base_config();
        config.telemetry.push(ItemConfig {
            key: "payload".to_owned(),
            data_source_type: DataSource::Advertisement,
            ..ItemConfig::default()
        });
        let profile = DeviceProfile::from_config(&config, &ConverterDefaults::default()).unwrap();
        assert!(profile.is_advertisement_only());
    }
}
