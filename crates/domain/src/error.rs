//! Configuration errors raised while validating a device definition.
//!
//! Each layer defines its own typed errors; the application layer wraps
//! [`ConfigError`] via `#[from]`.

/// Why a device configuration was rejected.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The device name is empty or whitespace only.
    #[error("device name must not be empty")]
    EmptyName,

    /// The MAC address could not be parsed.
    #[error("invalid MAC address for device {device}")]
    InvalidAddress {
        /// Device name the address belongs to.
        device: String,
        /// Underlying parse failure.
        #[source]
        source: AddressError,
    },

    /// The poll period must be strictly positive.
    #[error("poll period of device {device} must be greater than zero")]
    ZeroPollPeriod {
        /// Device name.
        device: String,
    },

    /// An item has no key.
    #[error("item #{index} of {section} on device {device} has an empty key")]
    EmptyKey {
        /// Device name.
        device: String,
        /// Section (`telemetry` or `attributes`).
        section: &'static str,
        /// Position of the item in its section.
        index: usize,
    },

    /// A characteristic-sourced item does not state `read` or `notify`.
    #[error("item {key} on device {device} needs a method (read or notify)")]
    MissingMethod {
        /// Device name.
        device: String,
        /// Item key.
        key: String,
    },

    /// A characteristic-sourced item has no characteristic UUID.
    #[error("item {key} on device {device} needs a characteristic UUID")]
    MissingUuid {
        /// Device name.
        device: String,
        /// Item key.
        key: String,
    },

    /// A characteristic UUID could not be parsed.
    #[error("item {key} on device {device} has an invalid characteristic UUID {value:?}")]
    InvalidUuid {
        /// Device name.
        device: String,
        /// Item key.
        key: String,
        /// Raw value from the configuration.
        value: String,
    },
}

/// Details about why a MAC address string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// Wrong number of octets.
    #[error("expected 6 octets, got {actual}")]
    OctetCount {
        /// Octets found.
        actual: usize,
    },

    /// An octet is not a two-digit hex number.
    #[error("octet {octet:?} is not a two-digit hex number")]
    InvalidOctet {
        /// The offending octet.
        octet: String,
    },

    /// Both `:` and `-` separators were used.
    #[error("mixed octet separators")]
    MixedSeparators,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_empty_key_error() {
        let err = ConfigError::EmptyKey {
            device: "Sensor".to_owned(),
            section: "telemetry",
            index: 2,
        };
        assert_eq!(
            err.to_string(),
            "item #2 of telemetry on device Sensor has an empty key"
        );
    }

    #[test]
    fn should_expose_address_error_as_source() {
        let err = ConfigError::InvalidAddress {
            device: "Sensor".to_owned(),
            source: AddressError::OctetCount { actual: 4 },
        };
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "expected 6 octets, got 4");
    }

    #[test]
    fn should_display_invalid_octet_error() {
        let err = AddressError::InvalidOctet {
            octet: "G1".to_owned(),
        };
        assert_eq!(err.to_string(), "octet \"G1\" is not a two-digit hex number");
    }
}
