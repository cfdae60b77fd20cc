//! Acquisition timestamps.

use chrono::{DateTime, Utc};

/// UTC instant at which data was received from a device.
pub type Timestamp = DateTime<Utc>;

/// The current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Instant from milliseconds since the Unix epoch, the unit telemetry
/// carries on the wire. `None` when out of range.
#[must_use]
pub fn from_millis(millis: i64) -> Option<Timestamp> {
    DateTime::from_timestamp_millis(millis)
}
