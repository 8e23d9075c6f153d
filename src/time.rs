//! Timestamp parsing and elapsed-time arithmetic.
//!
//! Historical logs mix representations: some timestamps carry fractional
//! seconds (`2024-01-01 10:00:00.123`), some carry a trailing UTC offset
//! (`2024-01-01 10:00:00+02:00`), some use the ISO `T` separator. Every
//! timestamp is reduced to the wall-clock time it names; the offset is
//! dropped, because the split time is itself an offset-less wall-clock value
//! and both must live on the same axis.

use chrono::{DateTime, NaiveDateTime};

use crate::error::ValidationError;

/// Wall-clock instant used throughout the evaluator.
pub type Timestamp = NaiveDateTime;

/// Format of the global split time.
pub const SPLIT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

/// Parses a log timestamp.
///
/// Accepts an optional fractional-second part and an optional UTC offset
/// (`+02:00`, `+0200` or `Z`). With an offset present the local wall-clock
/// reading is kept.
///
/// # Errors
///
/// Returns `ValidationError::InvalidTimestamp` if no supported form matches.
///
/// # Examples
///
/// ```
/// use recsim_eval::time::parse_timestamp;
///
/// let a = parse_timestamp("2024-01-01 10:00:00.123").unwrap();
/// let b = parse_timestamp("2024-01-01T10:00:00+02:00").unwrap();
/// assert_eq!(a.date(), b.date());
/// ```
pub fn parse_timestamp(value: &str) -> Result<Timestamp, ValidationError> {
    let trimmed = value.trim();

    for format in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(trimmed, format) {
            return Ok(parsed.naive_local());
        }
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.naive_local());
    }
    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(parsed);
        }
    }

    Err(ValidationError::InvalidTimestamp {
        value: value.to_string(),
    })
}

/// Parses the split time, which must use exactly `SPLIT_TIME_FORMAT`.
///
/// # Errors
///
/// Returns `ValidationError::InvalidTimestamp` for any other shape.
pub fn parse_split_time(value: &str) -> Result<Timestamp, ValidationError> {
    NaiveDateTime::parse_from_str(value.trim(), SPLIT_TIME_FORMAT).map_err(|_| {
        ValidationError::InvalidTimestamp {
            value: value.to_string(),
        }
    })
}

/// Minutes elapsed from `start` to `end`; negative when `end` precedes `start`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn minutes_between(start: Timestamp, end: Timestamp) -> f64 {
    let delta = end - start;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 60_000_000.0,
        None => delta.num_milliseconds() as f64 / 60_000.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn parses_plain_timestamp() {
        let ts = parse_timestamp("2024-01-01 10:00:00").unwrap();
        assert_eq!(ts.to_string(), "2024-01-01 10:00:00");
    }

    #[test]
    fn parses_fractional_seconds() {
        let ts = parse_timestamp("2024-01-01 10:00:00.123").unwrap();
        let split = parse_split_time("2024-01-01 09:00:00").unwrap();
        assert!(approx(minutes_between(split, ts), 60.0 + 0.123 / 60.0));
    }

    #[test]
    fn parses_offset_as_wall_clock() {
        let ts = parse_timestamp("2024-01-01T10:00:00+02:00").unwrap();
        let split = parse_split_time("2024-01-01 09:00:00").unwrap();
        assert!(approx(minutes_between(split, ts), 60.0));
    }

    #[test]
    fn fractional_and_offset_forms_agree_on_whole_seconds() {
        let a = parse_timestamp("2024-01-01 10:00:00.000").unwrap();
        let b = parse_timestamp("2024-01-01 10:00:00+01:00").unwrap();
        let c = parse_timestamp("2024-01-01T10:00:00Z").unwrap();
        let d = parse_timestamp("2024-01-01 10:00:00.000+0530").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(c, d);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timestamp("01/01/2024 10:00").is_err());
        assert!(parse_timestamp("").is_err());
    }

    #[test]
    fn split_time_is_strict() {
        assert!(parse_split_time("2024-01-01 09:00:00").is_ok());
        assert!(parse_split_time("2024-01-01T09:00:00").is_err());
        assert!(parse_split_time("2024-01-01 09:00:00.5").is_err());
    }

    #[test]
    fn minutes_between_is_signed() {
        let a = parse_split_time("2024-01-01 09:00:00").unwrap();
        let b = parse_split_time("2024-01-01 08:30:00").unwrap();
        assert!(approx(minutes_between(a, b), -30.0));
        assert!(approx(minutes_between(b, a), 30.0));
    }
}
