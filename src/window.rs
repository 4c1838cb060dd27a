//! Timestamp normalization and the retention window.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};

use crate::item::Item;

/// Anything earlier than this is treated as garbage from the feed.
pub const MIN_PLAUSIBLE_YEAR: i32 = 2020;

/// Longest retention window accepted, ten years.
pub const MAX_WINDOW_HOURS: u64 = 24 * 365 * 10;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Result of tolerant timestamp parsing.
///
/// `Defaulted` carries the "now" that was substituted, so callers can tell a
/// real timestamp from a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedTime {
    Parsed(NaiveDateTime),
    Defaulted(NaiveDateTime),
}

impl ParsedTime {
    pub fn value(self) -> NaiveDateTime {
        match self {
            ParsedTime::Parsed(ts) | ParsedTime::Defaulted(ts) => ts,
        }
    }

    pub fn is_defaulted(&self) -> bool {
        matches!(self, ParsedTime::Defaulted(_))
    }
}

/// Current time as timezone-naive UTC.
pub fn now_naive() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Parse a raw feed timestamp, substituting `now` when it is unparseable or
/// earlier than [`MIN_PLAUSIBLE_YEAR`].
pub fn parse_or_default(raw: &str, now: NaiveDateTime) -> ParsedTime {
    match parse_timestamp(raw) {
        Some(ts) => plausible_or_default(ts, now),
        None => ParsedTime::Defaulted(now),
    }
}

/// Same policy for timestamps the feed parser already decoded.
pub fn from_feed_time(value: Option<DateTime<Utc>>, now: NaiveDateTime) -> ParsedTime {
    match value {
        Some(ts) => plausible_or_default(ts.naive_utc(), now),
        None => ParsedTime::Defaulted(now),
    }
}

fn plausible_or_default(ts: NaiveDateTime, now: NaiveDateTime) -> ParsedTime {
    if ts.year() < MIN_PLAUSIBLE_YEAR {
        ParsedTime::Defaulted(now)
    } else {
        ParsedTime::Parsed(ts)
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.naive_utc());
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Rolling retention window, inclusive at its boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    span: Duration,
}

impl TimeWindow {
    /// Spans longer than [`MAX_WINDOW_HOURS`] are clamped.
    pub fn from_hours(hours: u64) -> Self {
        Self {
            span: Duration::hours(hours.min(MAX_WINDOW_HOURS) as i64),
        }
    }

    pub fn contains(&self, published: NaiveDateTime, now: NaiveDateTime) -> bool {
        now - published <= self.span
    }

    pub fn retain(&self, items: Vec<Item>, now: NaiveDateTime) -> Vec<Item> {
        items
            .into_iter()
            .filter(|item| self.contains(item.published, now))
            .collect()
    }
}
