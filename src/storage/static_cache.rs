use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use serde::{Deserialize, Serialize};
use log::debug;
use parking_lot::RwLock;
use crate::core::error::{Error, Result};
use crate::core::types::FieldValue;
use crate::schema::record::{Provenance, Record};
use crate::schema::schema::TableSchema;
use crate::storage::flat_file::FlatFileReader;
use crate::storage::layout::StorageLayout;
use crate::storage::walker::is_skippable;

pub type RecordSet = Arc<Vec<Arc<Record>>>;

/// Identity of a file's contents as far as caching is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub dev: u64,
    pub ino: u64,
    pub mtime: i64,
    pub mtime_nsec: i64,
    pub len: u64,
}

impl FileStamp {
    /// `Ok(None)` if the file does not exist or a parent is a plain file.
    pub fn of(path: &Path) -> Result<Option<FileStamp>> {
        match fs::metadata(path) {
            Ok(meta) => Ok(Some(FileStamp {
                dev: meta.dev(),
                ino: meta.ino(),
                mtime: meta.mtime(),
                mtime_nsec: meta.mtime_nsec(),
                len: meta.size(),
            })),
            Err(e) if is_skippable(&e) => Ok(None),
            Err(e) => Err(Error::io(e, path.display())),
        }
    }
}

struct StaticEntry {
    stamp: FileStamp,
    overlay: Option<(PathBuf, Option<FileStamp>)>,
    records: RecordSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StaticCacheStats {
    pub entries: usize,
    pub records: usize,
    pub disk_loads: usize,
}

/// Parsed static tables keyed by file path.
///
/// Entries are replaced whole when the backing file (or its overlay) changes
/// and are never mutated in place, so a `RecordSet` handed out stays valid
/// while other queries reload. Share one cache between databases with `Arc`.
pub struct StaticTableCache {
    entries: RwLock<HashMap<PathBuf, StaticEntry>>,
    disk_loads: AtomicUsize,
}

impl StaticTableCache {
    pub fn new() -> Self {
        StaticTableCache {
            entries: RwLock::new(HashMap::new()),
            disk_loads: AtomicUsize::new(0),
        }
    }

    /// Records of `path`, with the records of `overlay` (if it exists)
    /// appended. Parses only when either file changed since the last load.
    pub fn load(&self, schema: &Arc<TableSchema>, path: &Path, overlay: Option<&Path>) -> Result<RecordSet> {
        let stamp = FileStamp::of(path)?
            .ok_or_else(|| Error::not_found(format!("static table {}", path.display())))?;
        let overlay_stamp = match overlay {
            Some(p) => Some((p.to_path_buf(), FileStamp::of(p)?)),
            None => None,
        };

        if let Some(entry) = self.entries.read().get(path) {
            if entry.stamp == stamp && entry.overlay == overlay_stamp {
                return Ok(entry.records.clone());
            }
        }

        let mut records = self.read_file(schema, path)?;
        if let Some((overlay_path, Some(_))) = &overlay_stamp {
            records.extend(self.read_file(schema, overlay_path)?);
        }
        if schema.name.eq_ignore_ascii_case("sitechan") {
            annotate_channels(&mut records);
        }
        let records: RecordSet = Arc::new(records.into_iter().map(Arc::new).collect());
        debug!("loaded {} {} records from {}", records.len(), schema.name, path.display());

        self.entries.write().insert(
            path.to_path_buf(),
            StaticEntry { stamp, overlay: overlay_stamp, records: records.clone() },
        );
        Ok(records)
    }

    fn read_file(&self, schema: &Arc<TableSchema>, path: &Path) -> Result<Vec<Record>> {
        self.disk_loads.fetch_add(1, Ordering::Relaxed);
        let provenance = static_provenance(path, &schema.name);
        FlatFileReader::read_all(path, schema.clone())?
            .into_iter()
            .map(|(offset, mut record)| {
                record.set_provenance(Arc::new(Provenance { offset, ..(*provenance).clone() }));
                Ok(record)
            })
            .collect()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StaticCacheStats {
        let entries = self.entries.read();
        StaticCacheStats {
            entries: entries.len(),
            records: entries.values().map(|e| e.records.len()).sum(),
            disk_loads: self.disk_loads.load(Ordering::Relaxed),
        }
    }
}

impl Default for StaticTableCache {
    fn default() -> Self {
        StaticTableCache::new()
    }
}

fn static_provenance(path: &Path, table: &str) -> Arc<Provenance> {
    let dir = path.parent().map(|d| d.display().to_string()).unwrap_or_default();
    let prefix = StorageLayout::split_table_file(path).map(|(p, _)| p).unwrap_or("global");
    Arc::new(Provenance {
        dir: dir.into(),
        prefix: prefix.into(),
        file: path.into(),
        format: "css",
        author: "static".into(),
        table: table.into(),
        structure: None,
        offset: 0,
    })
}

/// Short and long spellings of the same channel.
const CHANNEL_CODES: &[(&str, &str)] = &[
    ("sz", "SHZ"), ("sn", "SHN"), ("se", "SHE"),
    ("bz", "BHZ"), ("bn", "BHN"), ("be", "BHE"),
    ("lz", "LHZ"), ("ln", "LHN"), ("le", "LHE"),
    ("hz", "HHZ"), ("hn", "HHN"), ("he", "HHE"),
    ("ez", "EHZ"), ("en", "EHN"), ("ee", "EHE"),
    ("mz", "MHZ"), ("mn", "MHN"), ("me", "MHE"),
];

/// The other spelling of `chan`, if it has one.
pub fn alternate_channel(chan: &str) -> Option<&'static str> {
    CHANNEL_CODES.iter().find_map(|(short, long)| {
        if chan.eq_ignore_ascii_case(short) {
            Some(*long)
        } else if chan.eq_ignore_ascii_case(long) {
            Some(*short)
        } else {
            None
        }
    })
}

pub fn annotate_channel(record: &mut Record) {
    let alternate = record
        .get_by_name("chan")
        .and_then(FieldValue::as_str)
        .and_then(alternate_channel);
    if let Some(code) = alternate {
        // chan2 is a string column, so this cannot fail
        let _ = record.set_by_name("chan2", FieldValue::Text(code.to_string()));
    }
}

pub fn station_key(record: &Record) -> String {
    record.get_by_name("sta").and_then(FieldValue::as_str).unwrap_or("").to_ascii_uppercase()
}

/// Fill `chan2` on station-channel records and order them by station.
pub fn annotate_channels(records: &mut [Record]) {
    records.iter_mut().for_each(annotate_channel);
    records.sort_by_cached_key(station_key);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::schema::SchemaRegistry;
    use crate::storage::flat_file::FlatFileWriter;
    use tempfile::TempDir;

    fn sitechan(sta: &str, chan: &str) -> Record {
        let mut r = Record::new(SchemaRegistry::builtin().get("sitechan").unwrap());
        r.set_by_name("sta", FieldValue::Text(sta.into())).unwrap();
        r.set_by_name("chan", FieldValue::Text(chan.into())).unwrap();
        r
    }

    #[test]
    fn second_load_reuses_records() {
        let dir = TempDir::new().unwrap();
        let path = FlatFileWriter::append(dir.path(), "global", &[sitechan("B", "sz"), sitechan("A", "BHZ")]).unwrap();
        let schema = SchemaRegistry::builtin().get("sitechan").unwrap();
        let cache = StaticTableCache::new();

        let first = cache.load(&schema, &path, None).unwrap();
        let second = cache.load(&schema, &path, None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first[0], &second[0]));
        assert_eq!(cache.stats().disk_loads, 1);

        // sorted by station, alternate codes filled in
        assert_eq!(first[0].get_by_name("sta"), Some(&FieldValue::Text("A".into())));
        assert_eq!(first[0].get_by_name("chan2"), Some(&FieldValue::Text("bz".into())));
        assert_eq!(first[1].get_by_name("chan2"), Some(&FieldValue::Text("SHZ".into())));
        assert_eq!(first[1].provenance().map(|p| p.offset), Some(0));
    }

    #[test]
    fn changed_file_or_overlay_reloads() {
        let dir = TempDir::new().unwrap();
        let path = FlatFileWriter::append(dir.path(), "global", &[sitechan("A", "BHZ")]).unwrap();
        let local = dir.path().join("local.sitechan");
        let schema = SchemaRegistry::builtin().get("sitechan").unwrap();
        let cache = StaticTableCache::new();

        assert_eq!(cache.load(&schema, &path, Some(&local)).unwrap().len(), 1);
        FlatFileWriter::append(dir.path(), "local", &[sitechan("C", "SHZ")]).unwrap();
        assert_eq!(cache.load(&schema, &path, Some(&local)).unwrap().len(), 2);
        FlatFileWriter::append(dir.path(), "global", &[sitechan("B", "BHN")]).unwrap();
        assert_eq!(cache.load(&schema, &path, Some(&local)).unwrap().len(), 3);
        assert_eq!(cache.stats().entries, 1);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.load(&schema, &dir.path().join("none"), None).is_err());
    }
}
