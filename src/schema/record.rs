use std::fmt;
use std::path::Path;
use std::sync::Arc;
use chrono::NaiveDateTime;
use crate::core::error::{Error, Result};
use crate::core::time::{self, NULL_TIME};
use crate::core::types::FieldValue;
use crate::schema::schema::{ColumnDef, ColumnType, TableSchema};

const LDDATE_FORMAT: &str = "%y/%m/%d %H:%M:%S";

/// Where an accepted record came from. Update and delete by offset need all
/// of it, so it is stamped onto every record handed back by a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    pub dir: Arc<str>,
    pub prefix: Arc<str>,
    pub file: Arc<Path>,
    pub format: &'static str,
    pub author: Arc<str>,
    pub table: Arc<str>,
    pub structure: Option<Arc<str>>,
    pub offset: u64,
}

/// One fixed-width line of a flat-file table, decoded through its schema.
#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<TableSchema>,
    values: Vec<FieldValue>,
    provenance: Option<Arc<Provenance>>,
}

impl Record {
    /// A record with every member set to its null value.
    pub fn new(schema: Arc<TableSchema>) -> Self {
        let values = schema
            .columns
            .iter()
            .map(|c| c.column_type.null_value())
            .collect();
        Record { schema, values, provenance: None }
    }

    pub fn from_line(schema: Arc<TableSchema>, line: &str) -> Result<Self> {
        let mut record = Record::new(schema);
        record.read_line(line)?;
        Ok(record)
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    pub fn table_name(&self) -> &str {
        &self.schema.name
    }

    pub fn member_count(&self) -> usize {
        self.values.len()
    }

    pub fn member(&self, index: usize) -> Option<&ColumnDef> {
        self.schema.member(index)
    }

    pub fn line_length(&self) -> usize {
        self.schema.line_length
    }

    pub fn get(&self, index: usize) -> Option<&FieldValue> {
        self.values.get(index)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&FieldValue> {
        self.schema.column_index(name).and_then(|i| self.values.get(i))
    }

    pub fn set(&mut self, index: usize, value: FieldValue) -> Result<()> {
        let column = self.schema.member(index).ok_or_else(|| {
            Error::invalid_argument(format!("{}: no member {}", self.schema.name, index))
        })?;
        let value = coerce(column, value)?;
        self.values[index] = value;
        Ok(())
    }

    pub fn set_by_name(&mut self, name: &str, value: FieldValue) -> Result<()> {
        let index = self.schema.column_index(name).ok_or_else(|| {
            Error::invalid_argument(format!("{}: no member {}", self.schema.name, name))
        })?;
        self.set(index, value)
    }

    pub fn provenance(&self) -> Option<&Provenance> {
        self.provenance.as_deref()
    }

    pub fn set_provenance(&mut self, provenance: Arc<Provenance>) {
        self.provenance = Some(provenance);
    }

    /// Decode one line. Fields past the end of a short line read as blank;
    /// a field that does not parse as its column type is a scan error.
    pub fn read_line(&mut self, line: &str) -> Result<()> {
        let line = line.trim_end_matches(['\n', '\r']);
        for (index, column) in self.schema.columns.iter().enumerate() {
            if !column.stored {
                continue;
            }
            let start = column.start.min(line.len());
            let end = column.end().min(line.len());
            let raw = line.get(start..end).ok_or_else(|| {
                Error::scan(format!("{}.{}: field splits a character", self.schema.name, column.name))
            })?;
            self.values[index] = parse_field(column, raw.trim()).map_err(|msg| {
                Error::scan(format!("{}.{}: {}", self.schema.name, column.name, msg))
            })?;
        }
        Ok(())
    }

    /// Encode as one fixed-width line, without the trailing newline.
    pub fn write_line(&self) -> Result<String> {
        let mut line = String::with_capacity(self.schema.line_length);
        for (column, value) in self.schema.columns.iter().zip(&self.values) {
            if !column.stored {
                continue;
            }
            if column.start > 0 {
                line.push(' ');
            }
            let field = format_field(column, value);
            if field.len() > column.width {
                return Err(Error::scan(format!(
                    "{}.{}: '{}' does not fit in {} columns",
                    self.schema.name, column.name, field, column.width
                )));
            }
            line.push_str(&field);
        }
        Ok(line)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}(", self.schema.name)?;
        for (i, (column, value)) in self.schema.columns.iter().zip(&self.values).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", column.name, value)?;
        }
        write!(f, ")")
    }
}

fn parse_field(column: &ColumnDef, raw: &str) -> std::result::Result<FieldValue, String> {
    let blank = raw.is_empty() || raw == "-";
    match column.column_type {
        ColumnType::String => Ok(FieldValue::Text(if raw.is_empty() { "-".to_string() } else { raw.to_string() })),
        ColumnType::Int | ColumnType::Long => {
            if blank {
                return Ok(FieldValue::Integer(-1));
            }
            raw.parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|_| format!("'{}' is not an integer", raw))
        }
        ColumnType::Float | ColumnType::Double => {
            if blank {
                return Ok(FieldValue::Number(-1.0));
            }
            raw.parse::<f64>()
                .map(FieldValue::Number)
                .map_err(|_| format!("'{}' is not a number", raw))
        }
        ColumnType::Time => {
            if blank {
                return Ok(FieldValue::Time(NULL_TIME));
            }
            raw.parse::<f64>()
                .map(FieldValue::Time)
                .map_err(|_| format!("'{}' is not an epoch time", raw))
        }
        ColumnType::Date => {
            if blank {
                return Ok(FieldValue::Time(NULL_TIME));
            }
            NaiveDateTime::parse_from_str(raw, LDDATE_FORMAT)
                .map(|dt| time::datetime_to_epoch(&dt.and_utc()))
                .ok()
                .or_else(|| time::parse_time_expression(raw))
                .map(FieldValue::Time)
                .ok_or_else(|| format!("'{}' is not a date", raw))
        }
    }
}

fn format_field(column: &ColumnDef, value: &FieldValue) -> String {
    let width = column.width;
    match (column.column_type, value) {
        (ColumnType::String, v) => format!("{:<width$}", v.to_string()),
        (ColumnType::Date, v) => {
            let text = v.as_f64()
                .and_then(|t| time::format_epoch(t, LDDATE_FORMAT))
                .unwrap_or_else(|| "-".to_string());
            format!("{:<width$}", text)
        }
        (ColumnType::Int | ColumnType::Long, v) => {
            format!("{:>width$}", v.as_f64().map(|f| f as i64).unwrap_or(-1))
        }
        (_, v) => {
            let value = v.as_f64().unwrap_or(-1.0);
            // shed decimals until the value fits; write_line reports what still overflows
            (0..=column.precision)
                .rev()
                .map(|precision| format!("{:>width$.precision$}", value))
                .find(|text| text.len() <= width)
                .unwrap_or_else(|| format!("{:>width$.0}", value))
        }
    }
}

fn coerce(column: &ColumnDef, value: FieldValue) -> Result<FieldValue> {
    let mismatch = |v: &FieldValue| {
        Error::invalid_argument(format!("{} cannot hold {:?}", column.name, v))
    };
    match column.column_type {
        ColumnType::String => match value {
            FieldValue::Text(_) => Ok(value),
            other => Err(mismatch(&other)),
        },
        ColumnType::Int | ColumnType::Long => match value {
            FieldValue::Integer(_) => Ok(value),
            FieldValue::Number(v) if v.fract() == 0.0 => Ok(FieldValue::Integer(v as i64)),
            other => Err(mismatch(&other)),
        },
        ColumnType::Float | ColumnType::Double => match value.as_f64() {
            Some(v) => Ok(FieldValue::Number(v)),
            None => Err(mismatch(&value)),
        },
        ColumnType::Date | ColumnType::Time => match value.as_f64() {
            Some(v) => Ok(FieldValue::Time(v)),
            None => Err(mismatch(&value)),
        },
    }
}
