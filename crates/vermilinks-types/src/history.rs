//! Bounded reading history.

use crate::reading::Reading;

/// Maximum number of readings kept in a history series.
///
/// One sample every five minutes for 28 hours; denser series are cut to the
/// most recent entries.
pub const HISTORY_LIMIT: usize = 336;

/// Merge `incoming` readings into `existing` history.
///
/// The result is sorted ascending by parsed timestamp (readings without a
/// parseable timestamp sort first, keeping their relative order), blank
/// readings are dropped, and only the newest [`HISTORY_LIMIT`] entries are
/// kept. Samples with identical timestamps are all kept.
///
/// Neither input is modified; a new series is returned.
///
/// # Examples
///
/// ```
/// use vermilinks_types::{Reading, merge};
///
/// let older = vec![Reading::new("bin-1").at("2024-01-01T00:10:00Z")];
/// let newer = vec![Reading::new("bin-1").at("2024-01-01T00:05:00Z")];
///
/// let merged = merge(&older, &newer);
/// assert_eq!(merged[0].timestamp.as_ref().unwrap().to_string(), "2024-01-01T00:05:00.000Z");
/// ```
pub fn merge(existing: &[Reading], incoming: &[Reading]) -> Vec<Reading> {
    merge_bounded(existing, incoming, HISTORY_LIMIT)
}

/// [`merge`] with a custom bound.
pub fn merge_bounded(existing: &[Reading], incoming: &[Reading], limit: usize) -> Vec<Reading> {
    let mut merged: Vec<Reading> = existing
        .iter()
        .chain(incoming)
        .filter(|reading| !reading.is_blank())
        .cloned()
        .collect();

    // Stable: equal keys keep arrival order
    merged.sort_by_key(Reading::instant);

    if merged.len() > limit {
        merged.drain(..merged.len() - limit);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::UNKNOWN_DEVICE;

    fn at(ts: &str) -> Reading {
        Reading::new("bin-1").at(ts)
    }

    fn stamps(readings: &[Reading]) -> Vec<String> {
        readings
            .iter()
            .map(|r| r.timestamp.as_ref().map(ToString::to_string).unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_merge_sorts_across_inputs() {
        let existing = vec![at("2024-01-01T00:00:00Z"), at("2024-01-01T00:20:00Z")];
        let incoming = vec![at("2024-01-01T00:10:00Z")];

        let merged = merge(&existing, &incoming);
        assert_eq!(
            stamps(&merged),
            vec![
                "2024-01-01T00:00:00.000Z",
                "2024-01-01T00:10:00.000Z",
                "2024-01-01T00:20:00.000Z"
            ]
        );
    }

    #[test]
    fn test_unparseable_sorts_first() {
        let merged = merge(&[at("2024-01-01T00:00:00Z")], &[at("garbage")]);
        assert_eq!(stamps(&merged), vec!["garbage", "2024-01-01T00:00:00.000Z"]);
    }

    #[test]
    fn test_missing_timestamp_sorts_first() {
        let mut untimed = Reading::new("bin-1");
        untimed.temperature = Some(20.0);
        let merged = merge(&[at("2024-01-01T00:00:00Z")], &[untimed.clone()]);
        assert_eq!(merged[0], untimed);
    }

    #[test]
    fn test_duplicates_are_kept() {
        let merged = merge(&[at("2024-01-01T00:00:00Z")], &[at("2024-01-01T00:00:00Z")]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_blank_entries_dropped() {
        let merged = merge(&[Reading::new(UNKNOWN_DEVICE)], &[at("2024-01-01T00:00:00Z")]);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_truncates_oldest_first() {
        let existing: Vec<Reading> = (0..HISTORY_LIMIT)
            .map(|i| at(&format!("2024-01-01T{:02}:{:02}:00Z", i / 60, i % 60)))
            .collect();
        let incoming = vec![at("2024-01-02T00:00:00Z")];

        let merged = merge(&existing, &incoming);
        assert_eq!(merged.len(), HISTORY_LIMIT);
        assert_eq!(stamps(&merged)[0], "2024-01-01T00:01:00.000Z");
        assert_eq!(
            stamps(&merged).last().map(String::as_str),
            Some("2024-01-02T00:00:00.000Z")
        );
    }

    #[test]
    fn test_merge_bounded() {
        let merged = merge_bounded(
            &[at("2024-01-01T00:00:00Z"), at("2024-01-01T00:01:00Z")],
            &[at("2024-01-01T00:02:00Z")],
            2,
        );
        assert_eq!(
            stamps(&merged),
            vec!["2024-01-01T00:01:00.000Z", "2024-01-01T00:02:00.000Z"]
        );
    }
}
