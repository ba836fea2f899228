use std::cmp::Ordering;
use std::fmt;
use serde::{Serialize, Deserialize};

/// A single field value read from a flat-file line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Number(f64),
    Time(f64),  // epoch seconds, also used for calendar dates
}

impl FieldValue {
    /// Numeric view; integer, float, date and time fields all coerce to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Number(v) | FieldValue::Time(v) => Some(*v),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, FieldValue::Text(_))
    }

    /// Compare two values the way constraints do: strings case-insensitively,
    /// everything else as doubles. Mixed text/number never compares.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Text(a), FieldValue::Text(b)) => Some(cmp_ignore_case(a, b)),
            (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Number(v) => write!(f, "{}", v),
            FieldValue::Time(v) => write!(f, "{:.5}", v),
        }
    }
}

/// Closed scan window `[tmin, tmax]` in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub tmin: f64,
    pub tmax: f64,
}

impl TimeWindow {
    pub fn unbounded() -> Self {
        TimeWindow { tmin: f64::MIN, tmax: f64::MAX }
    }

    pub fn new(tmin: f64, tmax: f64) -> Self {
        TimeWindow { tmin, tmax }
    }

    pub fn is_unbounded(&self) -> bool {
        self.tmin == f64::MIN && self.tmax == f64::MAX
    }

    /// A partition covering `[start, start + duration)` is worth reading.
    pub fn admits_partition(&self, start: f64, duration: f64) -> bool {
        start + duration >= self.tmin && start <= self.tmax
    }

    pub fn raise_min(&mut self, tmin: f64) {
        self.tmin = self.tmin.max(tmin);
    }

    pub fn lower_max(&mut self, tmax: f64) {
        self.tmax = self.tmax.min(tmax);
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        TimeWindow::unbounded()
    }
}

pub fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    let a = a.bytes().map(|c| c.to_ascii_lowercase());
    let b = b.bytes().map(|c| c.to_ascii_lowercase());
    a.cmp(b)
}
