//! Platform-agnostic telemetry types for VermiLinks vermicompost monitors.
//!
//! This crate holds the pure half of the telemetry synchronization engine:
//!
//! - [`Reading`]: the canonical sensor sample
//! - [`normalize`] / [`normalize_value`]: turn snapshot and push payloads into readings
//! - [`is_live`]: decide whether a reading comes from a live, reporting device
//! - [`merge`]: fold readings into a sorted, bounded history
//!
//! Nothing here performs I/O or panics on malformed input.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use vermilinks_types::{is_live, merge, normalize_value};
//!
//! let reading = normalize_value(&json!({
//!     "deviceId": "bin-1",
//!     "deviceOnline": true,
//!     "temperature": 23.4,
//!     "timestamp": "2024-01-01T00:00:00Z",
//! }))
//! .unwrap();
//!
//! assert!(is_live(&reading));
//! let history = merge(&[], &[reading]);
//! assert_eq!(history.len(), 1);
//! ```

pub mod connectivity;
pub mod history;
pub mod normalize;
pub mod reading;
pub mod timestamp;

pub use connectivity::is_live;
pub use history::{HISTORY_LIMIT, merge, merge_bounded};
pub use normalize::{RawPayload, normalize, normalize_value};
pub use reading::{Reading, UNKNOWN_DEVICE};
pub use timestamp::ReadingTime;

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{Value, json};

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            any::<f64>().prop_map(|f| json!(f)),
            ".*".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::hash_map(
                    prop_oneof![
                        Just("deviceId".to_string()),
                        Just("device".to_string()),
                        Just("timestamp".to_string()),
                        Just("updated_at".to_string()),
                        Just("temperature".to_string()),
                        Just("sensors".to_string()),
                        Just("data".to_string()),
                        Just("status".to_string()),
                        "[a-z]{1,8}",
                    ],
                    inner,
                    0..6
                )
                .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    fn arb_trust() -> impl Strategy<Value = (Option<bool>, Option<String>, Option<bool>)> {
        (
            proptest::option::of(any::<bool>()),
            proptest::option::of("[a-zA-Z]{0,8}"),
            proptest::option::of(any::<bool>()),
        )
    }

    fn arb_reading() -> impl Strategy<Value = Reading> {
        (
            "[a-c]",
            proptest::option::of(prop_oneof![
                (0i64..4_000_000_000).prop_map(|secs| {
                    ReadingTime::from_epoch_millis(secs as f64 * 1000.0).to_string()
                }),
                "[a-z ]{0,10}",
            ]),
            proptest::option::of(-40.0f64..80.0),
        )
            .prop_map(|(device, ts, temperature)| {
                let mut reading = Reading::new(device);
                reading.timestamp = ts.as_deref().map(ReadingTime::parse);
                reading.temperature = temperature;
                reading
            })
    }

    proptest! {
        /// Normalizing arbitrary JSON never panics and never yields an empty device id.
        #[test]
        fn normalize_never_panics(value in arb_json()) {
            let reading = normalize(&RawPayload::classify(&value));
            prop_assert!(!reading.device_id.is_empty());
        }

        /// Garbage timestamps are passed through, never replaced.
        #[test]
        fn malformed_timestamp_kept(raw in "[a-z]{1,12}") {
            let reading = normalize_value(&json!({"deviceId": "A", "timestamp": raw.clone()})).unwrap();
            prop_assert_eq!(reading.timestamp, Some(ReadingTime::Unparsed(raw)));
        }

        /// Liveness only depends on the three trust fields.
        #[test]
        fn is_live_ignores_measurements(
            (online, status, stale) in arb_trust(),
            temperature in proptest::option::of(-40.0f64..80.0),
        ) {
            let mut a = Reading::new("A");
            a.device_online = online;
            a.device_status = status.clone();
            a.is_stale = stale;
            let mut b = a.clone();
            b.temperature = temperature;
            b.device_id = "B".to_string();
            prop_assert_eq!(is_live(&a), is_live(&b));
            prop_assert_eq!(
                is_live(&a),
                connectivity::evaluate(online, status.as_deref(), stale)
            );
        }

        /// Merged history is sorted and bounded.
        #[test]
        fn merge_sorted_and_bounded(
            existing in prop::collection::vec(arb_reading(), 0..400),
            incoming in prop::collection::vec(arb_reading(), 0..400),
        ) {
            let merged = merge(&existing, &incoming);
            prop_assert!(merged.len() <= HISTORY_LIMIT);
            prop_assert!(merged.windows(2).all(|w| w[0].instant() <= w[1].instant()));
        }
    }
}
