//! Timezone resolution and date normalization.
//!
//! The API returns instants as ISO-8601 strings, sometimes with a
//! colon-less UTC offset (`+0000`). Everything is normalized to UTC
//! once and converted to a resolved zone only at the point of
//! comparison or display.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;

use crate::error::{Error, Result};

/// A resolved display/comparison zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Named(Tz),
    Local,
}

impl Zone {
    /// Calendar date of `instant` in this zone.
    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            Zone::Named(tz) => instant.with_timezone(tz).date_naive(),
            Zone::Local => instant.with_timezone(&Local).date_naive(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Zone::Named(tz) => tz.name().to_string(),
            Zone::Local => "Local".to_string(),
        }
    }

    /// Wall-clock rendering plus the zone name, for formatted output.
    pub fn render(&self, instant: DateTime<Utc>) -> (String, String) {
        const FMT: &str = "%Y-%m-%d %H:%M:%S";
        match self {
            Zone::Named(tz) => (
                instant.with_timezone(tz).format(FMT).to_string(),
                tz.name().to_string(),
            ),
            Zone::Local => (
                instant.with_timezone(&Local).format(FMT).to_string(),
                "Local".to_string(),
            ),
        }
    }
}

/// Parse an IANA zone name, failing loudly.
///
/// Used where a zone is explicit user input; resolution inside queries
/// goes through [`resolve_timezone`] instead, which degrades.
pub fn parse_zone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| Error::InvalidTimezone(name.to_string()))
}

/// Pick the zone for a task: the task's own zone wins, then the
/// configured default, then the system local zone.
///
/// Invalid or empty candidates are skipped with a warning rather than
/// failing the query. The literal name "local" (any case) means the
/// system zone.
pub fn resolve_timezone(task_tz: Option<&str>, configured: Option<&str>) -> Zone {
    for candidate in [task_tz, configured].into_iter().flatten() {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            continue;
        }
        if candidate.eq_ignore_ascii_case("local") {
            return Zone::Local;
        }
        match candidate.parse::<Tz>() {
            Ok(tz) => return Zone::Named(tz),
            Err(_) => {
                tracing::warn!(zone = candidate, "ignoring unknown timezone name");
            }
        }
    }
    Zone::Local
}

/// Insert the missing colon into a trailing `+HHMM`/`-HHMM` offset so
/// the string parses as RFC 3339. Leaves anything else untouched.
fn insert_offset_colon(raw: &str) -> String {
    let bytes = raw.as_bytes();
    if bytes.len() >= 5 {
        let tail = &bytes[bytes.len() - 5..];
        if (tail[0] == b'+' || tail[0] == b'-')
            && tail[1..].iter().all(|b| b.is_ascii_digit())
        {
            let split = raw.len() - 2;
            return format!("{}:{}", &raw[..split], &raw[split..]);
        }
    }
    raw.to_string()
}

/// Parse an API date string into a UTC instant.
///
/// Accepts RFC 3339 with `Z` or an offset (colon optional), a naive
/// datetime (treated as UTC), or a bare date (midnight UTC).
pub fn normalize_instant(raw: &str) -> Result<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidDateFormat(raw.to_string()));
    }
    let candidate = insert_offset_colon(trimmed);
    if let Ok(dt) = DateTime::parse_from_rfc3339(&candidate) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    Err(Error::InvalidDateFormat(raw.to_string()))
}

/// Render a UTC date string in the task's resolved zone.
///
/// Output is `"{local} ({zone}) [UTC: {raw}]"`; if the raw string does
/// not parse, falls back to `"{raw} (UTC)"` so display never fails.
pub fn convert_utc_to_local(raw: &str, task_tz: Option<&str>, configured: Option<&str>) -> String {
    match normalize_instant(raw) {
        Ok(instant) => {
            let zone = resolve_timezone(task_tz, configured);
            let (local, name) = zone.render(instant);
            format!("{local} ({name}) [UTC: {raw}]")
        }
        Err(_) => {
            tracing::warn!(date = raw, "could not parse date for display");
            format!("{raw} (UTC)")
        }
    }
}
