use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parses the timestamp shapes seen in exported stock rows.
///
/// Accepts RFC 3339, naive date-times (read as UTC), bare dates (UTC midnight) and
/// integer epoch milliseconds. Anything else yields `None`.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
    }

    s.parse::<i64>().ok().and_then(from_epoch_millis)
}

pub fn from_epoch_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Comparable instant in epoch milliseconds. Missing timestamps sort as the epoch.
pub fn instant_millis(ts: Option<DateTime<Utc>>) -> i64 {
    ts.map(|t| t.timestamp_millis()).unwrap_or(0)
}
