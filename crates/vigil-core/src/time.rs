//! Parsing stored timestamps into UTC instants.
//!
//! Stores hand back creation times in several shapes:
//!
//! | Input                              | Zone          |
//! |------------------------------------|---------------|
//! | `2026-02-19T23:36:58.384268Z`      | explicit UTC  |
//! | `2026-02-19 23:36:58.384268+00`    | short offset  |
//! | `2026-02-19 23:36:58+05:30`        | full offset   |
//! | `2026-02-19 23:00:00`              | none          |
//!
//! A value with no zone suffix is UTC. It is never interpreted in the host's
//! local time zone.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::{Error, Result};

const NAIVE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const OFFSET_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

/// Parse `raw` into a UTC instant, assuming UTC when no zone is present.
pub fn parse_utc(raw: &str) -> Result<DateTime<Utc>> {
  let trimmed = raw.trim();
  let unparseable = || Error::TimestampUnparseable(raw.to_owned());

  if trimmed.len() < 19 || !trimmed.is_ascii() {
    return Err(unparseable());
  }
  if !matches!(trimmed.as_bytes()[10], b' ' | b'T' | b't') {
    return Err(unparseable());
  }

  // Normalise the date/time separator so one format string covers both.
  let normalised = format!("{} {}", &trimmed[..10], &trimmed[11..]);
  let (body, zone) = split_zone(&normalised);

  match zone {
    None => NaiveDateTime::parse_from_str(body, NAIVE_FORMAT)
      .map(|naive| naive.and_utc())
      .map_err(|_| unparseable()),
    Some(zone) => {
      let offset = normalise_offset(zone).ok_or_else(unparseable)?;
      DateTime::parse_from_str(&format!("{body}{offset}"), OFFSET_FORMAT)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| unparseable())
    }
  }
}

/// Split a trailing zone designator (`Z`, `+HH`, `+HHMM`, `-HH:MM`) off the
/// time portion. The date's own hyphens are never considered.
fn split_zone(s: &str) -> (&str, Option<&str>) {
  if let Some(body) = s.strip_suffix(['Z', 'z']) {
    return (body, Some("Z"));
  }
  let time_part = &s[11..];
  match time_part.rfind(['+', '-']) {
    Some(i) => {
      let at = 11 + i;
      (&s[..at], Some(&s[at..]))
    }
    None => (s, None),
  }
}

/// Expand a zone designator to the `±HH:MM` form chrono's `%:z` expects.
fn normalise_offset(zone: &str) -> Option<String> {
  if zone == "Z" {
    return Some("+00:00".to_owned());
  }
  let (sign, digits) = zone.split_at(1);
  let digits: String = digits.chars().filter(|c| *c != ':').collect();
  if !digits.chars().all(|c| c.is_ascii_digit()) {
    return None;
  }
  match digits.len() {
    2 => Some(format!("{sign}{digits}:00")),
    4 => Some(format!("{sign}{}:{}", &digits[..2], &digits[2..])),
    _ => None,
  }
}
