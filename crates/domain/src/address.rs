//! Bluetooth device addresses.

use std::fmt;
use std::str::FromStr;

use crate::error::AddressError;

/// A 48-bit Bluetooth device address.
///
/// Parsed from six hex octets separated by `:` (Linux, Windows) or `-`
/// (macOS-style configuration); always displayed upper-case with colons,
/// e.g. `"A4:C1:38:5B:0E:DF"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Wrap raw octets (most significant first).
    #[must_use]
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Access the raw octets.
    #[must_use]
    pub const fn octets(self) -> [u8; 6] {
        self.0
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for MacAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let separator = match (s.contains(':'), s.contains('-')) {
            (true, true) => return Err(AddressError::MixedSeparators),
            (false, true) => '-',
            _ => ':',
        };

        let parts: Vec<&str> = s.split(separator).collect();
        if parts.len() != 6 {
            return Err(AddressError::OctetCount {
                actual: parts.len(),
            });
        }

        let mut octets = [0u8; 6];
        for (slot, part) in octets.iter_mut().zip(&parts) {
            if part.len() != 2 {
                return Err(AddressError::InvalidOctet {
                    octet: (*part).to_owned(),
                });
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| AddressError::InvalidOctet {
                octet: (*part).to_owned(),
            })?;
        }

        Ok(Self(octets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_colon_separated_address() {
        let mac: MacAddress = "a4:c1:38:5b:0e:df".parse().unwrap();
        assert_eq!(mac.octets(), [0xA4, 0xC1, 0x38, 0x5B, 0x0E, 0xDF]);
    }

    #[test]
    fn should_parse_dash_separated_address() {
        let mac: MacAddress = "4C-65-A8-D4-6C-34".parse().unwrap();
        assert_eq!(mac.to_string(), "4C:65:A8:D4:6C:34");
    }

    #[test]
    fn should_display_upper_case_with_colons() {
        let mac = MacAddress::new([0x00, 0x01, 0x02, 0x0A, 0x0B, 0x0C]);
        assert_eq!(mac.to_string(), "00:01:02:0A:0B:0C");
    }

    #[test]
    fn should_reject_wrong_octet_count() {
        let err = "A4:C1:38:5B:0E".parse::<MacAddress>().unwrap_err();
        assert_eq!(err, AddressError::OctetCount { actual: 5 });
    }

    #[test]
    fn should_reject_address_without_separator() {
        let err = "A4C1385B0EDF".parse::<MacAddress>().unwrap_err();
        assert_eq!(err, AddressError::OctetCount { actual: 1 });
    }

    #[test]
    fn should_reject_non_hex_octet() {
        let err = "A4:C1:38:5B:0E:ZZ".parse::<MacAddress>().unwrap_err();
        assert!(matches!(err, AddressError::InvalidOctet { octet } if octet == "ZZ"));
    }

    #[test]
    fn should_reject_mixed_separators() {
        let err = "A4:C1-38:5B:0E:DF".parse::<MacAddress>().unwrap_err();
        assert_eq!(err, AddressError::MixedSeparators);
    }
}
