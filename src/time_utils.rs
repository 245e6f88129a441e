// SPDX-License-Identifier: MIT

//! Shared helpers for date/time handling.

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a provider offset string like "-08:00" or "+05:30".
pub fn parse_utc_offset(offset: &str) -> Option<FixedOffset> {
    let offset = offset.trim();
    if offset.is_empty() || offset == "Z" {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = if let Some(rest) = offset.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = offset.strip_prefix('-') {
        (-1, rest)
    } else {
        return None;
    };

    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Convert a UTC instant to local wall-clock time using a provider offset
/// string. Falls back to UTC when the offset does not parse.
pub fn to_local_naive(instant: DateTime<Utc>, offset: &str) -> NaiveDateTime {
    match parse_utc_offset(offset) {
        Some(offset) => instant.with_timezone(&offset).naive_local(),
        None => {
            tracing::warn!(offset, "Unparseable timezone offset, using UTC");
            instant.naive_utc()
        }
    }
}
