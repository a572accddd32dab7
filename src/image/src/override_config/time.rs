//! Creation timestamp parsing.

use chrono::{DateTime, Utc};

/// Values above this are taken to be milliseconds since the epoch.
const MILLIS_THRESHOLD: f64 = 1.0e11;

/// Parse a creation time given as seconds (or milliseconds) since the epoch,
/// or as an RFC 3339 timestamp.
///
/// Empty input means the epoch. Anything unparseable also falls back to the
/// epoch, with a warning, so that a bad stamp value never breaks a build.
pub fn parse_creation_time(value: &str) -> DateTime<Utc> {
    let value = value.trim();
    if value.is_empty() {
        return DateTime::UNIX_EPOCH;
    }
    if let Some(time) = parse_epoch_seconds(value) {
        return time;
    }
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return time.with_timezone(&Utc);
    }
    tracing::warn!(value, "Unparseable creation time, using the epoch");
    DateTime::UNIX_EPOCH
}

fn parse_epoch_seconds(value: &str) -> Option<DateTime<Utc>> {
    let mut seconds: f64 = value.parse().ok()?;
    if !seconds.is_finite() {
        return None;
    }
    if seconds > MILLIS_THRESHOLD {
        seconds /= 1000.0;
    }
    let mut whole = seconds.trunc() as i64;
    let mut nanos = ((seconds - seconds.trunc()) * 1.0e9).round() as i64;
    if nanos < 0 {
        whole -= 1;
        nanos += 1_000_000_000;
    }
    if nanos >= 1_000_000_000 {
        whole += 1;
        nanos -= 1_000_000_000;
    }
    DateTime::from_timestamp(whole, nanos as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::image_config::format_time;

    #[test]
    fn test_empty_is_epoch() {
        assert_eq!(parse_creation_time(""), DateTime::UNIX_EPOCH);
        assert_eq!(format_time(&parse_creation_time("")), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_seconds() {
        let t = parse_creation_time("1553200000");
        assert_eq!(format_time(&t), "2019-03-21T20:26:40Z");
    }

    #[test]
    fn test_fractional_seconds() {
        let t = parse_creation_time("1.5");
        assert_eq!(t.timestamp(), 1);
        assert_eq!(t.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_milliseconds() {
        let seconds = parse_creation_time("1553200000");
        let millis = parse_creation_time("1553200000000");
        assert_eq!(seconds, millis);
    }

    #[test]
    fn test_rfc3339() {
        let t = parse_creation_time("2019-03-21T19:41:04+02:00");
        assert_eq!(format_time(&t), "2019-03-21T17:41:04Z");
    }

    #[test]
    fn test_garbage_falls_back_to_epoch() {
        assert_eq!(parse_creation_time("yesterday"), DateTime::UNIX_EPOCH);
        assert_eq!(parse_creation_time("{BUILD_TIMESTAMP}"), DateTime::UNIX_EPOCH);
        assert_eq!(parse_creation_time("NaN"), DateTime::UNIX_EPOCH);
        assert_eq!(parse_creation_time("inf"), DateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_negative_fraction() {
        let t = parse_creation_time("-1.5");
        assert_eq!(t.timestamp(), -2);
        assert_eq!(t.timestamp_subsec_millis(), 500);
    }
}
