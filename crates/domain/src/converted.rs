//! Converter output: typed telemetry and attribute points.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// A decoded value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Json(serde_json::Value),
}

impl From<bool> for DataValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for DataValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for DataValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for DataValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for DataValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

/// One timestamped telemetry sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPoint {
    /// Sample time, serialized as milliseconds since the Unix epoch.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub ts: Timestamp,
    pub values: HashMap<String, DataValue>,
}

/// What a converter produces from one envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertedData {
    pub device_name: String,
    pub device_type: String,
    pub telemetry: Vec<TelemetryPoint>,
    pub attributes: HashMap<String, DataValue>,
}

impl ConvertedData {
    /// Empty output for a device.
    #[must_use]
    pub fn new(device_name: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            device_type: device_type.into(),
            telemetry: Vec::new(),
            attributes: HashMap::new(),
        }
    }

    /// Append a telemetry sample.
    #[must_use]
    pub fn with_telemetry(mut self, point: TelemetryPoint) -> Self {
        self.telemetry.push(point);
        self
    }

    /// Set an attribute, replacing any previous value for the key.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Whether nothing was decoded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.telemetry.is_empty() && self.attributes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_start_empty() {
        let data = ConvertedData::new("Thermometer", "default");
        assert!(data.is_empty());
    }

    #[test]
    fn should_collect_telemetry_and_attributes() {
        let point = TelemetryPoint {
            ts: crate::time::now(),
            values: HashMap::from([("battery".to_owned(), DataValue::Int(100))]),
        };
        let data = ConvertedData::new("Thermometer", "default")
            .with_telemetry(point)
            .with_attribute("firmware", "1.0.3");

        assert!(!data.is_empty());
        assert_eq!(data.telemetry[0].values["battery"], DataValue::Int(100));
        assert_eq!(
            data.attributes["firmware"],
            DataValue::String("1.0.3".to_owned())
        );
    }

    #[test]
    fn should_serialize_untagged_values() {
        let data = ConvertedData::new("Beacon", "beacon").with_attribute("active", true);
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["deviceName"], "Beacon");
        assert_eq!(json["attributes"]["active"], true);
    }

    #[test]
    fn should_serialize_sample_time_as_epoch_millis() {
        let point = TelemetryPoint {
            ts: crate::time::from_millis(1_700_000_000_123).unwrap(),
            values: HashMap::new(),
        };
        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(json["ts"], 1_700_000_000_123_i64);
    }
}
