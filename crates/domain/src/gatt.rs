//! GATT UUID helpers.

use uuid::Uuid;

/// The Bluetooth SIG base UUID (`0000xxxx-0000-1000-8000-00805F9B34FB`).
pub const BLUETOOTH_BASE_UUID: Uuid = Uuid::from_u128(0x0000_0000_0000_1000_8000_0080_5F9B_34FB);

/// Expand a 16- or 32-bit assigned number onto the Bluetooth base UUID.
#[must_use]
pub const fn from_short(short: u32) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID.as_u128() | ((short as u128) << 96))
}

/// Parse a characteristic or service UUID as written in configuration.
///
/// Accepts 16-bit (`"FFE1"`), 32-bit (`"0000FFE1"`) and full 128-bit
/// forms, case-insensitively. Returns `None` for anything else.
#[must_use]
pub fn parse_uuid(value: &str) -> Option<Uuid> {
    let value = value.trim();
    let short = value.strip_prefix("0x").unwrap_or(value);

    if matches!(short.len(), 4 | 8) {
        return u32::from_str_radix(short, 16).ok().map(from_short);
    }

    Uuid::parse_str(value).ok()
}
