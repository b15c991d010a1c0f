//! Output formatting.

use anyhow::Result;
use serde::Serialize;

use vermilinks_core::{PollStatus, SyncSnapshot};
use vermilinks_types::Reading;

/// Render a reading as aligned text lines.
pub fn format_reading_text(reading: &Reading, live: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!("Device:       {}\n", reading.device_id));
    if let Some(ts) = &reading.timestamp {
        out.push_str(&format!("Timestamp:    {}\n", ts));
    }
    out.push_str(&format!(
        "Status:       {}\n",
        if live { "online" } else { "offline" }
    ));

    let rows: [(&str, Option<f64>, &str); 11] = [
        ("Temperature", reading.temperature, "°C"),
        ("Humidity", reading.humidity, "%"),
        ("Moisture", reading.moisture, "%"),
        ("pH", reading.ph, ""),
        ("EC", reading.ec, " mS/cm"),
        ("Nitrogen", reading.nitrogen, " mg/kg"),
        ("Phosphorus", reading.phosphorus, " mg/kg"),
        ("Potassium", reading.potassium, " mg/kg"),
        ("Water level", reading.water_level, " cm"),
        ("Battery", reading.battery_level, "%"),
        ("Signal", reading.signal_strength, " dBm"),
    ];
    for (label, value, unit) in rows {
        if let Some(value) = value {
            out.push_str(&format!("{:<13} {}{}\n", format!("{label}:"), value, unit));
        }
    }
    if let Some(state) = reading.float_state {
        out.push_str(&format!("{:<13} {}\n", "Float:", state));
    }
    out
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotOutput<'a> {
    reading: Option<&'a Reading>,
    live: bool,
}

/// Render a one-off snapshot result as pretty JSON.
pub fn format_snapshot_json(reading: Option<&Reading>, live: bool) -> Result<String> {
    let output = SnapshotOutput { reading, live };
    Ok(serde_json::to_string_pretty(&output)? + "\n")
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StateLine<'a> {
    status: PollStatus,
    connected: bool,
    transport_up: bool,
    is_polling: bool,
    latest: Option<&'a Reading>,
    history_len: usize,
    last_updated: Option<String>,
    last_error: Option<&'a str>,
}

/// Render a state change as one compact JSON line.
///
/// History is summarized by its length.
pub fn format_state_line(state: &SyncSnapshot) -> Result<String> {
    let line = StateLine {
        status: state.status,
        connected: state.connected,
        transport_up: state.transport_up,
        is_polling: state.is_polling,
        latest: state.latest.as_ref(),
        history_len: state.history.len(),
        last_updated: state
            .last_updated
            .map(|at| vermilinks_types::ReadingTime::from(at).to_string()),
        last_error: state.last_error.as_deref(),
    };
    Ok(serde_json::to_string(&line)? + "\n")
}
