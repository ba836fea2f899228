use std::fmt;
use chrono::{NaiveDate, NaiveTime};
use crate::core::error::{Error, Result};
use crate::core::time;

/// How partition directory names encode their start time.
#[derive(Debug, Clone, PartialEq)]
pub enum DirStructure {
    /// strftime-style pattern; each `/` adds one directory level.
    Pattern { pattern: String, levels: usize },
    /// Single level named `<name>YYYYMMDD`.
    DaySuffix,
}

impl DirStructure {
    pub fn from_pattern(pattern: Option<&str>) -> Result<Self> {
        let Some(pattern) = pattern.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) else {
            return Ok(DirStructure::DaySuffix);
        };
        let mut chars = pattern.chars();
        while let Some(c) = chars.next() {
            if c == '%' {
                match chars.next() {
                    Some('Y' | 'y' | 'm' | 'd' | 'j' | 'H' | 'M' | 'S' | '%') => {}
                    other => {
                        return Err(Error::config(format!(
                            "directory structure '{}': unsupported conversion %{}",
                            pattern,
                            other.map(String::from).unwrap_or_default()
                        )));
                    }
                }
            }
        }
        Ok(DirStructure::Pattern {
            pattern: pattern.to_string(),
            levels: pattern.matches('/').count() + 1,
        })
    }

    /// Directory levels between a root and a leaf partition.
    pub fn levels(&self) -> usize {
        match self {
            DirStructure::Pattern { levels, .. } => *levels,
            DirStructure::DaySuffix => 1,
        }
    }

    /// Relative partition path holding `epoch`.
    pub fn format(&self, epoch: f64) -> Option<String> {
        match self {
            DirStructure::Pattern { pattern, .. } => time::format_epoch(epoch, pattern),
            DirStructure::DaySuffix => time::format_epoch(epoch, "%Y%m%d"),
        }
    }

    /// Start time of the partition at `components` (root to leaf), or `None`
    /// when the names do not follow the structure.
    pub fn parse(&self, components: &[&str]) -> Option<f64> {
        match self {
            DirStructure::Pattern { pattern, levels } => {
                if components.len() != *levels {
                    return None;
                }
                parse_with_pattern(&components.join("/"), pattern)
            }
            DirStructure::DaySuffix => {
                let [name] = components else { return None };
                let digits = name.get(name.len().checked_sub(8)?..)?;
                if !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                let date = NaiveDate::parse_from_str(digits, "%Y%m%d").ok()?;
                Some(time::date_to_epoch(date))
            }
        }
    }

    /// Descriptor stamped into record provenance.
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DirStructure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DirStructure::Pattern { pattern, .. } => f.write_str(pattern),
            DirStructure::DaySuffix => f.write_str("<name>YYYYMMDD"),
        }
    }
}

#[derive(Default)]
struct Fields {
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
    ordinal: Option<u32>,
    hour: u32,
    minute: u32,
    second: u32,
}

/// Reads up to `max` digits from the front of `s`.
fn take_number(s: &mut &str, max: usize) -> Option<u32> {
    let len = s.bytes().take(max).take_while(u8::is_ascii_digit).count();
    if len == 0 {
        return None;
    }
    let value = s[..len].parse().ok()?;
    *s = &s[len..];
    Some(value)
}

fn parse_with_pattern(input: &str, pattern: &str) -> Option<f64> {
    let mut rest = input;
    let mut fields = Fields::default();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            rest = rest.strip_prefix(c)?;
            continue;
        }
        match chars.next()? {
            'Y' => fields.year = Some(take_number(&mut rest, 4)? as i32),
            'y' => {
                let yy = take_number(&mut rest, 2)? as i32;
                fields.year = Some(if yy < 70 { 2000 + yy } else { 1900 + yy });
            }
            'm' => fields.month = Some(take_number(&mut rest, 2)?),
            'd' => fields.day = Some(take_number(&mut rest, 2)?),
            'j' => fields.ordinal = Some(take_number(&mut rest, 3)?),
            'H' => fields.hour = take_number(&mut rest, 2)?,
            'M' => fields.minute = take_number(&mut rest, 2)?,
            'S' => fields.second = take_number(&mut rest, 2)?,
            '%' => rest = rest.strip_prefix('%')?,
            _ => return None,
        }
    }
    if !rest.is_empty() {
        return None;
    }

    let year = fields.year?;
    let date = match fields.ordinal {
        Some(ordinal) => NaiveDate::from_yo_opt(year, ordinal)?,
        None => NaiveDate::from_ymd_opt(year, fields.month.unwrap_or(1), fields.day.unwrap_or(1))?,
    };
    let time = NaiveTime::from_hms_opt(fields.hour, fields.minute, fields.second)?;
    Some(time::datetime_to_epoch(&date.and_time(time).and_utc()))
}
