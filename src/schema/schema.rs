use std::collections::HashMap;
use std::sync::Arc;
use serde::{Serialize, Deserialize};
use crate::core::error::{Error, Result};
use crate::core::time::NULL_TIME;
use crate::core::types::FieldValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    String,
    Int,
    Long,
    Float,
    Double,
    Date,   // calendar date (lddate), held as epoch seconds
    Time,   // epoch seconds
}

impl ColumnType {
    pub fn is_numeric(&self) -> bool {
        !matches!(self, ColumnType::String)
    }

    pub fn null_value(&self) -> FieldValue {
        match self {
            ColumnType::String => FieldValue::Text("-".to_string()),
            ColumnType::Int | ColumnType::Long => FieldValue::Integer(-1),
            ColumnType::Float | ColumnType::Double => FieldValue::Number(-1.0),
            ColumnType::Date | ColumnType::Time => FieldValue::Time(NULL_TIME),
        }
    }
}

/// One fixed-width column of a flat-file table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub start: usize,      // byte offset in the line
    pub width: usize,
    pub precision: usize,  // decimals for float columns
    pub stored: bool,      // false: in-memory annotation only
}

impl ColumnDef {
    pub fn end(&self) -> usize {
        self.start + self.width
    }
}

/// Column spec used to build a schema: name, type, width, precision.
pub type ColumnSpec<'a> = (&'a str, ColumnType, usize, usize);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub time_column: Option<usize>,
    pub line_length: usize,
}

impl TableSchema {
    /// Lay out columns left to right, one blank between fields.
    pub fn new(name: &str, specs: &[ColumnSpec]) -> Self {
        let mut columns = Vec::with_capacity(specs.len());
        let mut start = 0;
        for &(col, column_type, width, precision) in specs {
            columns.push(ColumnDef {
                name: col.to_string(),
                column_type,
                start,
                width,
                precision,
                stored: true,
            });
            start += width + 1;
        }
        let line_length = start.saturating_sub(1);
        let time_column = columns
            .iter()
            .position(|c| c.name == "time" && c.column_type == ColumnType::Time);

        TableSchema {
            name: name.to_string(),
            columns,
            time_column,
            line_length,
        }
    }

    /// Add a column that lives only in memory (never read or written).
    pub fn with_annotation(mut self, name: &str, column_type: ColumnType) -> Self {
        self.columns.push(ColumnDef {
            name: name.to_string(),
            column_type,
            start: self.line_length,
            width: 0,
            precision: 0,
            stored: false,
        });
        self
    }

    pub fn member_count(&self) -> usize {
        self.columns.len()
    }

    pub fn member(&self, index: usize) -> Option<&ColumnDef> {
        self.columns.get(index)
    }

    /// Case-insensitive column lookup.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Table name -> schema. Query strings are keyed by table name, so every table
/// a query may name has to be registered here first.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    tables: HashMap<String, Arc<TableSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        SchemaRegistry { tables: HashMap::new() }
    }

    /// Registry preloaded with the CSS 3.0 tables.
    pub fn builtin() -> Self {
        let mut registry = SchemaRegistry::new();
        for schema in css_tables() {
            registry.register(schema);
        }
        registry
    }

    pub fn register(&mut self, schema: TableSchema) -> Arc<TableSchema> {
        let schema = Arc::new(schema);
        self.tables.insert(schema.name.to_ascii_lowercase(), schema.clone());
        schema
    }

    pub fn get(&self, name: &str) -> Option<Arc<TableSchema>> {
        self.tables.get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn require(&self, name: &str) -> Result<Arc<TableSchema>> {
        self.get(name)
            .ok_or_else(|| Error::resolve(format!("unknown table: {}", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(&name.to_ascii_lowercase())
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }
}

fn css_tables() -> Vec<TableSchema> {
    use ColumnType::*;
    vec![
        TableSchema::new("origin", &[
            ("lat", Double, 9, 4), ("lon", Double, 9, 4), ("depth", Double, 9, 4),
            ("time", Time, 17, 5), ("orid", Long, 8, 0), ("evid", Long, 8, 0),
            ("jdate", Long, 8, 0), ("nass", Int, 4, 0), ("ndef", Int, 4, 0),
            ("ndp", Int, 4, 0), ("grn", Long, 8, 0), ("srn", Long, 8, 0),
            ("etype", String, 7, 0), ("depdp", Double, 9, 4), ("dtype", String, 1, 0),
            ("mb", Double, 7, 2), ("mbid", Long, 8, 0), ("ms", Double, 7, 2),
            ("msid", Long, 8, 0), ("ml", Double, 7, 2), ("mlid", Long, 8, 0),
            ("algorithm", String, 15, 0), ("auth", String, 15, 0),
            ("commid", Long, 8, 0), ("lddate", Date, 17, 0),
        ]),
        TableSchema::new("arrival", &[
            ("sta", String, 6, 0), ("time", Time, 17, 5), ("arid", Long, 8, 0),
            ("jdate", Long, 8, 0), ("stassid", Long, 8, 0), ("chanid", Long, 8, 0),
            ("chan", String, 8, 0), ("iphase", String, 8, 0), ("stype", String, 1, 0),
            ("deltim", Double, 6, 3), ("azimuth", Double, 7, 2), ("delaz", Double, 7, 2),
            ("slow", Double, 7, 2), ("delslo", Double, 7, 2), ("ema", Double, 7, 2),
            ("rect", Double, 7, 3), ("amp", Double, 10, 1), ("per", Double, 7, 2),
            ("logat", Double, 7, 2), ("clip", String, 1, 0), ("fm", String, 2, 0),
            ("snr", Double, 10, 2), ("qual", String, 1, 0), ("auth", String, 15, 0),
            ("commid", Long, 8, 0), ("lddate", Date, 17, 0),
        ]),
        TableSchema::new("assoc", &[
            ("arid", Long, 8, 0), ("orid", Long, 8, 0), ("sta", String, 6, 0),
            ("phase", String, 8, 0), ("belief", Double, 4, 2), ("delta", Double, 8, 3),
            ("seaz", Double, 7, 2), ("esaz", Double, 7, 2), ("timeres", Double, 8, 3),
            ("timedef", String, 1, 0), ("azres", Double, 7, 1), ("azdef", String, 1, 0),
            ("slores", Double, 7, 2), ("slodef", String, 1, 0), ("emares", Double, 7, 1),
            ("wgt", Double, 6, 3), ("vmodel", String, 15, 0), ("commid", Long, 8, 0),
            ("lddate", Date, 17, 0),
        ]),
        TableSchema::new("wfdisc", &[
            ("sta", String, 6, 0), ("chan", String, 8, 0), ("time", Time, 17, 5),
            ("wfid", Long, 8, 0), ("chanid", Long, 8, 0), ("jdate", Long, 8, 0),
            ("endtime", Time, 17, 5), ("nsamp", Long, 8, 0), ("samprate", Double, 11, 7),
            ("calib", Double, 16, 6), ("calper", Double, 16, 6), ("instype", String, 6, 0),
            ("segtype", String, 1, 0), ("datatype", String, 2, 0), ("clip", String, 1, 0),
            ("dir", String, 64, 0), ("dfile", String, 32, 0), ("foff", Long, 10, 0),
            ("commid", Long, 8, 0), ("lddate", Date, 17, 0),
        ]),
        TableSchema::new("site", &[
            ("sta", String, 6, 0), ("ondate", Long, 8, 0), ("offdate", Long, 8, 0),
            ("lat", Double, 9, 4), ("lon", Double, 9, 4), ("elev", Double, 9, 4),
            ("staname", String, 50, 0), ("statype", String, 4, 0), ("refsta", String, 6, 0),
            ("dnorth", Double, 9, 4), ("deast", Double, 9, 4), ("lddate", Date, 17, 0),
        ]),
        TableSchema::new("sitechan", &[
            ("sta", String, 6, 0), ("chan", String, 8, 0), ("ondate", Long, 8, 0),
            ("chanid", Long, 8, 0), ("offdate", Long, 8, 0), ("ctype", String, 4, 0),
            ("edepth", Double, 9, 4), ("hang", Double, 6, 1), ("vang", Double, 6, 1),
            ("descrip", String, 50, 0), ("lddate", Date, 17, 0),
        ])
        .with_annotation("chan2", String),
        TableSchema::new("affiliation", &[
            ("net", String, 8, 0), ("sta", String, 6, 0), ("lddate", Date, 17, 0),
        ]),
        TableSchema::new("network", &[
            ("net", String, 8, 0), ("netname", String, 80, 0), ("nettype", String, 4, 0),
            ("auth", String, 15, 0), ("commid", Long, 8, 0), ("lddate", Date, 17, 0),
        ]),
        TableSchema::new("lastid", &[
            ("keyname", String, 15, 0), ("keyvalue", Long, 8, 0), ("lddate", Date, 17, 0),
        ]),
    ]
}
