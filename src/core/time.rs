use std::fmt::Write;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Sentinel for an unset time field.
pub const NULL_TIME: f64 = -9999999999.999;

const DATETIME_FORMATS: &[&str] = &[
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%j %H:%M:%S%.f",
    "%Y-%j %H:%M:%S%.f",
];

const DATE_FORMATS: &[&str] = &["%Y/%m/%d", "%Y-%m-%d", "%Y/%j", "%Y-%j"];

/// Parse a time expression into epoch seconds (UTC).
///
/// Accepts plain epoch numbers and calendar forms such as
/// `2004/01/05 12:00:00`, `2004-01-05T12:00:00.5`, `2004/01/05` and the
/// Julian-day form `2004-005`.
pub fn parse_time_expression(input: &str) -> Option<f64> {
    let s = input.trim().trim_matches(|c| c == '\'' || c == '"').trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(epoch) = s.parse::<f64>() {
        return epoch.is_finite().then_some(epoch);
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(datetime_to_epoch(&dt.and_utc()));
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date_to_epoch(date));
        }
    }
    None
}

pub fn datetime_to_epoch(dt: &DateTime<Utc>) -> f64 {
    dt.timestamp() as f64 + dt.timestamp_subsec_nanos() as f64 * 1e-9
}

pub fn date_to_epoch(date: NaiveDate) -> f64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp() as f64)
        .unwrap_or(NULL_TIME)
}

pub fn epoch_to_datetime(epoch: f64) -> Option<DateTime<Utc>> {
    if !epoch.is_finite() || epoch == NULL_TIME {
        return None;
    }
    let secs = epoch.floor();
    let nanos = ((epoch - secs) * 1e9).round().min(999_999_999.0) as u32;
    Utc.timestamp_opt(secs as i64, nanos).single()
}

/// Format an epoch with a strftime pattern; `None` on a bad pattern or time.
pub fn format_epoch(epoch: f64, pattern: &str) -> Option<String> {
    let dt = epoch_to_datetime(epoch)?;
    let mut out = String::new();
    write!(out, "{}", dt.format(pattern)).ok()?;
    Some(out)
}

/// Julian date in the `YYYYDDD` form used by the `jdate` columns.
pub fn jdate(epoch: f64) -> Option<i64> {
    let dt = epoch_to_datetime(epoch)?;
    Some(dt.year() as i64 * 1000 + dt.ordinal() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_calendar_forms() {
        let midnight = parse_time_expression("2004/01/06").unwrap();
        assert_eq!(midnight, 1073347200.0);
        assert_eq!(parse_time_expression("'2004/01/06 00:00:00'"), Some(midnight));
        assert_eq!(parse_time_expression("2004-01-06T12:00:00"), Some(midnight + 43200.0));
        assert_eq!(parse_time_expression("2004-006"), Some(midnight));
        assert_eq!(parse_time_expression("123.5"), Some(123.5));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_time_expression("FIA0"), None);
        assert_eq!(parse_time_expression(""), None);
    }

    #[test]
    fn formats_and_jdate() {
        let t = 1073347200.0;
        assert_eq!(format_epoch(t, "%Y/%m/%d").as_deref(), Some("2004/01/06"));
        assert_eq!(jdate(t), Some(2004006));
        assert_eq!(jdate(NULL_TIME), None);
    }
}
