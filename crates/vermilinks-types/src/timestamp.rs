//! Reading timestamps.
//!
//! Devices and the backend report time in several shapes: RFC 3339 strings,
//! RFC 2822 strings, naive `YYYY-MM-DD HH:MM:SS` strings and epoch
//! milliseconds. [`ReadingTime`] keeps whatever could be parsed as an instant
//! and passes everything else through untouched, so a malformed value is never
//! replaced by the current time.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Output format: `2024-01-01T00:00:00.000Z`.
const ISO_MILLIS: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");

const NAIVE_FORMATS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]"),
];

const DATE_ONLY: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]");

/// Timestamp attached to a reading.
///
/// Ordering between readings uses [`ReadingTime::instant`]; unparsed values
/// have no instant and sort before every parsed one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadingTime {
    /// A successfully parsed instant, normalized to UTC.
    At(OffsetDateTime),
    /// A value that could not be parsed, kept verbatim.
    Unparsed(String),
}

impl ReadingTime {
    /// Parse a textual timestamp.
    ///
    /// Naive date-times without an offset are interpreted as UTC. A bare
    /// date resolves to midnight UTC.
    ///
    /// # Examples
    ///
    /// ```
    /// use vermilinks_types::ReadingTime;
    ///
    /// let t = ReadingTime::parse("2024-01-01T02:00:00+02:00");
    /// assert_eq!(t.to_string(), "2024-01-01T00:00:00.000Z");
    ///
    /// let raw = ReadingTime::parse("yesterday-ish");
    /// assert_eq!(raw.to_string(), "yesterday-ish");
    /// assert!(raw.instant().is_none());
    /// ```
    pub fn parse(raw: &str) -> Self {
        match parse_instant(raw.trim()) {
            Some(at) => Self::At(at.to_offset(UtcOffset::UTC)),
            None => Self::Unparsed(raw.to_string()),
        }
    }

    /// Build a timestamp from epoch milliseconds.
    ///
    /// Non-finite or out-of-range values are kept as their textual form.
    pub fn from_epoch_millis(millis: f64) -> Self {
        if millis.is_finite() {
            let nanos = (millis * 1_000_000.0) as i128;
            if let Ok(at) = OffsetDateTime::from_unix_timestamp_nanos(nanos) {
                return Self::At(at);
            }
        }
        Self::Unparsed(millis.to_string())
    }

    /// The parsed instant, if any.
    pub fn instant(&self) -> Option<OffsetDateTime> {
        match self {
            Self::At(at) => Some(*at),
            Self::Unparsed(_) => None,
        }
    }

    /// Whether the timestamp was parsed.
    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::At(_))
    }
}

impl From<OffsetDateTime> for ReadingTime {
    fn from(at: OffsetDateTime) -> Self {
        Self::At(at.to_offset(UtcOffset::UTC))
    }
}

impl From<&str> for ReadingTime {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl fmt::Display for ReadingTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At(at) => match at.to_offset(UtcOffset::UTC).format(ISO_MILLIS) {
                Ok(text) => f.write_str(&text),
                Err(_) => write!(f, "{}", at),
            },
            Self::Unparsed(raw) => f.write_str(raw),
        }
    }
}

impl Serialize for ReadingTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReadingTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

fn parse_instant(raw: &str) -> Option<OffsetDateTime> {
    if raw.is_empty() {
        return None;
    }

    if let Ok(at) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(at);
    }

    // "2024-01-01 00:00:00Z" is common from SQL backends
    if raw.len() > 10 && raw.as_bytes()[10] == b' ' {
        let with_t = format!("{}T{}", &raw[..10], &raw[11..]);
        if let Ok(at) = OffsetDateTime::parse(&with_t, &Rfc3339) {
            return Some(at);
        }
    }

    if let Ok(at) = OffsetDateTime::parse(raw, &Rfc2822) {
        return Some(at);
    }

    let naive = raw.strip_suffix('Z').unwrap_or(raw);
    for format in NAIVE_FORMATS {
        if let Ok(at) = PrimitiveDateTime::parse(naive, *format) {
            return Some(at.assume_utc());
        }
    }

    if let Ok(date) = Date::parse(raw, DATE_ONLY) {
        return Some(date.midnight().assume_utc());
    }

    None
}
