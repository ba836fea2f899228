#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use ffdb::storage::FlatFileWriter;
use ffdb::{Config, FFDatabase, FieldValue, Record, SchemaRegistry};
use tempfile::TempDir;

pub const DAY: f64 = 86400.0;
/// 2004/01/05 00:00:00 UTC
pub const JAN_05: f64 = 1073260800.0;

pub struct Fixture {
    pub dir: TempDir,
    pub db: FFDatabase,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(|c| c.with_dir_structure("%Y/%m/%d", DAY))
    }

    pub fn with_config(adjust: impl FnOnce(Config) -> Config) -> Self {
        let dir = TempDir::new().unwrap();
        let param = dir.path().join("param");
        let seg = dir.path().join("seg");
        fs::create_dir_all(&param).unwrap();
        fs::create_dir_all(&seg).unwrap();
        let config = adjust(Config::new(&param).with_seg_root(&seg).with_author("idc"));
        let db = FFDatabase::open(config).unwrap();
        Fixture { dir, db }
    }

    pub fn param_root(&self) -> PathBuf {
        self.dir.path().join("param")
    }

    /// Append `records` to the author partition holding `epoch`.
    pub fn put(&self, author: &str, epoch: f64, prefix: &str, records: &[Record]) -> PathBuf {
        let dir = self.db.partition_dir(author, epoch).unwrap();
        FlatFileWriter::append(&dir, prefix, records).unwrap()
    }

    /// Append row-table records under the station's segment tree.
    pub fn put_rows(&self, station: &str, epoch: f64, prefix: &str, records: &[Record]) -> PathBuf {
        let dir = self.db.row_partition_dir(station, epoch).unwrap();
        FlatFileWriter::append(&dir, prefix, records).unwrap()
    }

    /// Write `<param_root>/static/global.<table>`.
    pub fn put_static(&self, records: &[Record]) -> PathBuf {
        let dir = self.param_root().join("static");
        FlatFileWriter::append(&dir, "global", records).unwrap()
    }
}

pub fn record(table: &str, fields: &[(&str, FieldValue)]) -> Record {
    let schema = SchemaRegistry::builtin().get(table).unwrap();
    let mut r = Record::new(schema);
    for (name, value) in fields {
        r.set_by_name(name, value.clone()).unwrap();
    }
    r
}

pub fn text(s: &str) -> FieldValue {
    FieldValue::Text(s.to_string())
}

pub fn int(v: i64) -> FieldValue {
    FieldValue::Integer(v)
}

pub fn time(v: f64) -> FieldValue {
    FieldValue::Time(v)
}

pub fn origin(orid: i64, t: f64) -> Record {
    record("origin", &[("orid", int(orid)), ("time", time(t)), ("lat", FieldValue::Number(10.0))])
}

pub fn arrival(arid: i64, sta: &str, t: f64) -> Record {
    record("arrival", &[("arid", int(arid)), ("sta", text(sta)), ("time", time(t)), ("iphase", text("P"))])
}

pub fn assoc(arid: i64, orid: i64, sta: &str) -> Record {
    record("assoc", &[("arid", int(arid)), ("orid", int(orid)), ("sta", text(sta))])
}

pub fn affiliation(net: &str, sta: &str) -> Record {
    record("affiliation", &[("net", text(net)), ("sta", text(sta))])
}

pub fn site(sta: &str, lat: f64) -> Record {
    record("site", &[("sta", text(sta)), ("lat", FieldValue::Number(lat))])
}

pub fn wfdisc(wfid: i64, sta: &str, chan: &str, t: f64) -> Record {
    record(
        "wfdisc",
        &[("wfid", int(wfid)), ("sta", text(sta)), ("chan", text(chan)), ("time", time(t)), ("endtime", time(t + 60.0))],
    )
}

pub fn int_field(record: &Record, name: &str) -> i64 {
    match record.get_by_name(name) {
        Some(FieldValue::Integer(v)) => *v,
        other => panic!("{} is not an integer: {:?}", name, other),
    }
}
