//! Connectivity evaluation.
//!
//! A reading can carry up to three trust signals that may disagree with each
//! other. [`is_live`] applies a fixed precedence so snapshot and push readings
//! are judged by the same rules:
//!
//! 1. `device_online`, when present, decides.
//! 2. Otherwise `device_status`, compared case-insensitively with `"online"`.
//! 3. Otherwise `is_stale`, inverted.
//! 4. Otherwise the reading is not live.

use crate::reading::Reading;

/// Textual status that counts as live.
pub const ONLINE_STATUS: &str = "online";

/// Whether a reading represents a live, reporting device.
///
/// # Examples
///
/// ```
/// use vermilinks_types::{Reading, is_live};
///
/// let mut reading = Reading::new("bin-1");
/// assert!(!is_live(&reading));
///
/// reading.device_status = Some("ONLINE".to_string());
/// assert!(is_live(&reading));
///
/// reading.device_online = Some(false);
/// assert!(!is_live(&reading));
/// ```
pub fn is_live(reading: &Reading) -> bool {
    evaluate(
        reading.device_online,
        reading.device_status.as_deref(),
        reading.is_stale,
    )
}

/// The precedence rules over bare signals.
pub fn evaluate(online: Option<bool>, status: Option<&str>, stale: Option<bool>) -> bool {
    if let Some(online) = online {
        return online;
    }
    if let Some(status) = status {
        return status.to_lowercase() == ONLINE_STATUS;
    }
    if let Some(stale) = stale {
        return !stale;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_signal_is_not_live() {
        assert!(!evaluate(None, None, None));
    }

    #[test]
    fn test_online_flag_wins() {
        assert!(evaluate(Some(true), Some("offline"), Some(true)));
        assert!(!evaluate(Some(false), Some("online"), Some(false)));
    }

    #[test]
    fn test_status_beats_staleness() {
        assert!(evaluate(None, Some("Online"), Some(true)));
        assert!(!evaluate(None, Some("offline"), Some(false)));
        assert!(!evaluate(None, Some(""), Some(false)));
    }

    #[test]
    fn test_staleness_last() {
        assert!(evaluate(None, None, Some(false)));
        assert!(!evaluate(None, None, Some(true)));
    }

    #[test]
    fn test_reading_signals() {
        let mut reading = Reading::new("A");
        reading.device_status = Some("offline".to_string());
        reading.temperature = Some(99.0);
        assert!(!is_live(&reading));
    }
}
