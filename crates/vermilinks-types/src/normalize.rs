//! Payload normalization.
//!
//! The backend speaks several dialects: the REST snapshot
//! (`soil_moisture`, `updated_at`, snake_case), push telemetry (camelCase with
//! `deviceId`/`timestamp`), and an older push shape that nests sensor values
//! under a `sensors` object. [`RawPayload::classify`] resolves the dialect once;
//! [`normalize`] turns any of them into a [`Reading`].
//!
//! Normalization never fails. Missing or malformed fields are simply absent
//! from the resulting reading.

use serde_json::{Map, Value};

use crate::reading::{Reading, UNKNOWN_DEVICE};
use crate::timestamp::ReadingTime;

const DEVICE_ID_KEYS: &[&str] = &["deviceId", "device_id", "device", "id"];
const TIMESTAMP_KEYS: &[&str] = &["timestamp", "updated_at", "updatedAt", "receivedAt"];

const TEMPERATURE_KEYS: &[&str] = &["temperature"];
const HUMIDITY_KEYS: &[&str] = &["humidity"];
const MOISTURE_KEYS: &[&str] = &["moisture", "soil_moisture", "soilMoisture"];
const PH_KEYS: &[&str] = &["ph", "pH"];
const EC_KEYS: &[&str] = &["ec"];
const NITROGEN_KEYS: &[&str] = &["nitrogen"];
const PHOSPHORUS_KEYS: &[&str] = &["phosphorus"];
const POTASSIUM_KEYS: &[&str] = &["potassium"];
const WATER_LEVEL_KEYS: &[&str] = &["waterLevel", "water_level", "float_distance"];
const FLOAT_STATE_KEYS: &[&str] = &["float_state", "floatSensor", "floatState"];
const BATTERY_KEYS: &[&str] = &["batteryLevel", "battery_level", "battery"];
const SIGNAL_KEYS: &[&str] = &["signalStrength", "signal_strength", "rssi"];

const ONLINE_KEYS: &[&str] = &["deviceOnline", "device_online", "online"];
const STATUS_KEYS: &[&str] = &["deviceStatus", "device_status", "status"];
const STALE_KEYS: &[&str] = &["isStale", "is_stale"];

/// Keys that only appear in the REST snapshot shape.
const SNAPSHOT_MARKERS: &[&str] = &["updated_at", "soil_moisture", "float_state"];

/// A raw payload with its dialect resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawPayload<'a> {
    /// Null, an empty object, an empty array, or a non-object value.
    Empty,
    /// REST snapshot object.
    Snapshot(&'a Map<String, Value>),
    /// Flat push telemetry object.
    Telemetry(&'a Map<String, Value>),
    /// Push object with measurements nested under `sensors`.
    Legacy {
        /// The outer object (device id, timestamp, trust signals).
        envelope: &'a Map<String, Value>,
        /// The nested measurement object.
        sensors: &'a Map<String, Value>,
    },
}

impl<'a> RawPayload<'a> {
    /// Resolve the dialect of a JSON value.
    ///
    /// `{ "data": ... }` response envelopes are unwrapped and arrays yield
    /// their first element.
    pub fn classify(value: &'a Value) -> Self {
        match value {
            Value::Array(items) => items.first().map_or(Self::Empty, Self::classify),
            Value::Object(map) if map.is_empty() => Self::Empty,
            Value::Object(map) => {
                if let Some(inner) = envelope_data(map) {
                    return Self::classify(inner);
                }
                if let Some(Value::Object(sensors)) = map.get("sensors") {
                    return Self::Legacy {
                        envelope: map,
                        sensors,
                    };
                }
                if SNAPSHOT_MARKERS.iter().any(|key| map.contains_key(*key)) {
                    Self::Snapshot(map)
                } else {
                    Self::Telemetry(map)
                }
            }
            _ => Self::Empty,
        }
    }

    /// Whether the payload carries nothing to normalize.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Unwrap `{ "success": true, "data": ... }` style envelopes.
///
/// An object counts as an envelope when it has a `data` key and none of the
/// reading keys at the top level.
fn envelope_data(map: &Map<String, Value>) -> Option<&Value> {
    let data = map.get("data")?;
    let looks_like_reading = DEVICE_ID_KEYS
        .iter()
        .chain(TIMESTAMP_KEYS)
        .chain(TEMPERATURE_KEYS)
        .chain(MOISTURE_KEYS)
        .any(|key| map.contains_key(*key));
    if looks_like_reading { None } else { Some(data) }
}

/// Normalize a classified payload into a [`Reading`].
///
/// [`RawPayload::Empty`] yields a reading for [`UNKNOWN_DEVICE`] with nothing
/// set; callers that need to tell "no reading" apart should check
/// [`RawPayload::is_empty`] first.
pub fn normalize(payload: &RawPayload<'_>) -> Reading {
    match payload {
        RawPayload::Empty => Reading::new(UNKNOWN_DEVICE),
        RawPayload::Snapshot(map) | RawPayload::Telemetry(map) => {
            let mut reading = envelope_fields(map);
            read_measurements(&mut reading, map);
            reading
        }
        RawPayload::Legacy { envelope, sensors } => {
            let mut reading = envelope_fields(envelope);
            // Some firmware puts values at the top level as well
            read_measurements(&mut reading, envelope);
            read_measurements(&mut reading, sensors);
            reading
        }
    }
}

/// Classify and normalize a JSON value in one step.
///
/// Returns `None` for empty payloads.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use vermilinks_types::normalize_value;
///
/// let reading = normalize_value(&json!({
///     "temperature": 24.1,
///     "soil_moisture": 61.0,
///     "updated_at": "2024-01-01T00:00:00Z",
/// }))
/// .unwrap();
///
/// assert_eq!(reading.device_id, "unknown-device");
/// assert_eq!(reading.moisture, Some(61.0));
/// assert_eq!(reading.humidity, None);
/// ```
pub fn normalize_value(value: &Value) -> Option<Reading> {
    let payload = RawPayload::classify(value);
    if payload.is_empty() {
        None
    } else {
        Some(normalize(&payload))
    }
}

fn envelope_fields(map: &Map<String, Value>) -> Reading {
    let device_id = DEVICE_ID_KEYS
        .iter()
        .find_map(|key| map.get(*key).and_then(device_id_value))
        .unwrap_or_else(|| UNKNOWN_DEVICE.to_string());

    let mut reading = Reading::new(device_id);
    reading.timestamp = TIMESTAMP_KEYS
        .iter()
        .find_map(|key| map.get(*key).and_then(timestamp_value));
    reading.device_online = first(map, ONLINE_KEYS, Value::as_bool);
    reading.device_status = first(map, STATUS_KEYS, |v| v.as_str().map(str::to_string));
    reading.is_stale = first(map, STALE_KEYS, Value::as_bool);
    reading
}

/// Fill measurements that are still unset from `map`.
fn read_measurements(reading: &mut Reading, map: &Map<String, Value>) {
    fill(&mut reading.temperature, map, TEMPERATURE_KEYS);
    fill(&mut reading.humidity, map, HUMIDITY_KEYS);
    fill(&mut reading.moisture, map, MOISTURE_KEYS);
    fill(&mut reading.ph, map, PH_KEYS);
    fill(&mut reading.ec, map, EC_KEYS);
    fill(&mut reading.nitrogen, map, NITROGEN_KEYS);
    fill(&mut reading.phosphorus, map, PHOSPHORUS_KEYS);
    fill(&mut reading.potassium, map, POTASSIUM_KEYS);
    fill(&mut reading.water_level, map, WATER_LEVEL_KEYS);
    fill(&mut reading.battery_level, map, BATTERY_KEYS);
    fill(&mut reading.signal_strength, map, SIGNAL_KEYS);
    if reading.float_state.is_none() {
        reading.float_state = first(map, FLOAT_STATE_KEYS, integer_value);
    }
}

fn fill(slot: &mut Option<f64>, map: &Map<String, Value>, keys: &[&str]) {
    if slot.is_none() {
        *slot = first(map, keys, number_value);
    }
}

fn first<T>(
    map: &Map<String, Value>,
    keys: &[&str],
    extract: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    keys.iter().find_map(|key| map.get(*key).and_then(&extract))
}

fn device_id_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn timestamp_value(value: &Value) -> Option<ReadingTime> {
    match value {
        Value::String(s) if !s.is_empty() => Some(ReadingTime::parse(s)),
        Value::Number(n) => n.as_f64().map(ReadingTime::from_epoch_millis),
        _ => None,
    }
}

/// Finite numbers, or strings that hold one. Anything else is absent.
fn number_value(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

fn integer_value(value: &Value) -> Option<i64> {
    match value {
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
