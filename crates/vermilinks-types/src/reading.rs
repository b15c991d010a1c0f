//! The canonical sensor reading.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::timestamp::ReadingTime;

/// Device id used when a payload does not name its device.
pub const UNKNOWN_DEVICE: &str = "unknown-device";

/// One sensor sample from a vermicompost monitor.
///
/// Every measurement is optional: a device that reports without any sensors
/// attached still produces a valid reading. Absent values stay `None` and are
/// never coerced to zero.
///
/// Serializes with camelCase keys and omits absent fields, which matches the
/// shape dashboard consumers already expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    /// Resolved device id. Never empty.
    pub device_id: String,
    /// Sample time, if the payload carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<ReadingTime>,

    /// Air temperature in °C.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Relative humidity in %.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    /// Bedding moisture in %.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moisture: Option<f64>,
    /// Bedding pH.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ph: Option<f64>,
    /// Electrical conductivity in mS/cm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ec: Option<f64>,
    /// Nitrogen in mg/kg.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nitrogen: Option<f64>,
    /// Phosphorus in mg/kg.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phosphorus: Option<f64>,
    /// Potassium in mg/kg.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub potassium: Option<f64>,
    /// Reservoir water level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water_level: Option<f64>,
    /// Float switch state as reported by the device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub float_state: Option<i64>,
    /// Battery charge in %.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<f64>,
    /// Radio signal strength in dBm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_strength: Option<f64>,

    /// Explicit online flag from the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_online: Option<bool>,
    /// Textual device status from the source (e.g. `"online"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_status: Option<String>,
    /// Explicit staleness flag from the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_stale: Option<bool>,
}

impl Reading {
    /// Create a reading for a device with nothing else set.
    ///
    /// An empty `device_id` is replaced by [`UNKNOWN_DEVICE`].
    pub fn new(device_id: impl Into<String>) -> Self {
        let device_id = device_id.into();
        Self {
            device_id: if device_id.trim().is_empty() {
                UNKNOWN_DEVICE.to_string()
            } else {
                device_id
            },
            timestamp: None,
            temperature: None,
            humidity: None,
            moisture: None,
            ph: None,
            ec: None,
            nitrogen: None,
            phosphorus: None,
            potassium: None,
            water_level: None,
            float_state: None,
            battery_level: None,
            signal_strength: None,
            device_online: None,
            device_status: None,
            is_stale: None,
        }
    }

    /// Set the timestamp.
    #[must_use]
    pub fn at(mut self, timestamp: impl Into<ReadingTime>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// The parsed sample instant, if the timestamp could be parsed.
    pub fn instant(&self) -> Option<OffsetDateTime> {
        self.timestamp.as_ref().and_then(ReadingTime::instant)
    }

    /// Whether any measurement is present.
    pub fn has_measurements(&self) -> bool {
        self.temperature.is_some()
            || self.humidity.is_some()
            || self.moisture.is_some()
            || self.ph.is_some()
            || self.ec.is_some()
            || self.nitrogen.is_some()
            || self.phosphorus.is_some()
            || self.potassium.is_some()
            || self.water_level.is_some()
            || self.float_state.is_some()
            || self.battery_level.is_some()
            || self.signal_strength.is_some()
    }

    /// Whether any trust signal is present.
    pub fn has_trust_signals(&self) -> bool {
        self.device_online.is_some() || self.device_status.is_some() || self.is_stale.is_some()
    }

    /// A reading that carries no information at all: unknown device, no
    /// timestamp, no measurements and no trust signals.
    ///
    /// History merging drops these.
    pub fn is_blank(&self) -> bool {
        self.device_id == UNKNOWN_DEVICE
            && self.timestamp.is_none()
            && !self.has_measurements()
            && !self.has_trust_signals()
    }

    /// Whether `other` is the same sample: same device and same timestamp.
    pub fn is_same_sample(&self, other: &Reading) -> bool {
        self.device_id == other.device_id
            && self.timestamp.is_some()
            && self.timestamp == other.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_replaces_empty_device_id() {
        assert_eq!(Reading::new("").device_id, UNKNOWN_DEVICE);
        assert_eq!(Reading::new("   ").device_id, UNKNOWN_DEVICE);
        assert_eq!(Reading::new("bin-1").device_id, "bin-1");
    }

    #[test]
    fn test_reading_without_measurements_is_valid() {
        let reading = Reading::new("bin-1").at("2024-01-01T00:00:00Z");
        assert!(!reading.has_measurements());
        assert!(!reading.is_blank());
    }

    #[test]
    fn test_blank_reading() {
        assert!(Reading::new(UNKNOWN_DEVICE).is_blank());

        let mut reading = Reading::new(UNKNOWN_DEVICE);
        reading.temperature = Some(0.0);
        assert!(!reading.is_blank());
    }

    #[test]
    fn test_same_sample_requires_timestamp() {
        let a = Reading::new("bin-1");
        let b = Reading::new("bin-1");
        assert!(!a.is_same_sample(&b));

        let a = a.at("2024-01-01T00:00:00Z");
        let b = b.at("2024-01-01T00:00:00.000Z");
        assert!(a.is_same_sample(&b));
        assert!(!a.is_same_sample(&Reading::new("bin-2").at("2024-01-01T00:00:00Z")));
    }

    #[test]
    fn test_serialization_omits_absent_fields() {
        let mut reading = Reading::new("bin-1").at("2024-01-01T00:00:00Z");
        reading.temperature = Some(24.1);

        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["deviceId"], "bin-1");
        assert_eq!(json["timestamp"], "2024-01-01T00:00:00.000Z");
        assert_eq!(json["temperature"], 24.1);
        assert!(json.get("humidity").is_none());
        assert!(json.get("deviceOnline").is_none());
    }
}
