use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use serde::{Deserialize, Serialize};
use log::trace;
use lru::LruCache;
use parking_lot::Mutex;
use crate::core::error::Result;
use crate::schema::record::Record;
use crate::schema::schema::TableSchema;
use crate::storage::flat_file::FlatFileReader;
use crate::storage::static_cache::FileStamp;

pub type CachedRows = Arc<Vec<(u64, Record)>>;

struct CachedFile {
    stamp: FileStamp,
    rows: CachedRows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileCacheStats {
    pub files: usize,
    pub records: usize,
    pub hits: u64,
    pub misses: u64,
}

/// In-memory copies of small partition files, bounded by total record
/// count. Least recently used files are evicted first.
pub struct FileCache {
    files: Mutex<LruCache<PathBuf, CachedFile>>,
    records: Mutex<usize>,
    max_records: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FileCache {
    pub fn new(max_records: usize) -> Self {
        FileCache {
            files: Mutex::new(LruCache::unbounded()),
            records: Mutex::new(0),
            max_records,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Rows of `path`, from memory when the file is unchanged. `Ok(None)`
    /// when the file is missing, sits under a plain file, or holds more
    /// lines than the cache may keep; callers stream those from disk.
    pub fn read(&self, path: &Path, schema: &Arc<TableSchema>) -> Result<Option<CachedRows>> {
        let Some(stamp) = FileStamp::of(path)? else {
            return Ok(None);
        };
        let estimate = stamp.len / (schema.line_length as u64 + 1);
        if estimate > self.max_records as u64 {
            return Ok(None);
        }

        if let Some(cached) = self.files.lock().get(path) {
            if cached.stamp == stamp {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(cached.rows.clone()));
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let Some(reader) = FlatFileReader::open(path, schema.clone())? else {
            return Ok(None);
        };
        let rows: CachedRows = Arc::new(reader.collect::<Result<Vec<_>>>()?);
        self.insert(path, stamp, rows.clone());
        Ok(Some(rows))
    }

    fn insert(&self, path: &Path, stamp: FileStamp, rows: CachedRows) {
        if rows.len() > self.max_records {
            return;
        }
        let mut files = self.files.lock();
        let mut total = self.records.lock();
        if let Some(old) = files.pop(path) {
            *total -= old.rows.len();
        }
        while *total + rows.len() > self.max_records {
            match files.pop_lru() {
                Some((evicted, old)) => {
                    trace!("evicting {} from file cache", evicted.display());
                    *total -= old.rows.len();
                }
                None => break,
            }
        }
        *total += rows.len();
        files.put(path.to_path_buf(), CachedFile { stamp, rows });
    }

    pub fn clear(&self) {
        let mut files = self.files.lock();
        files.clear();
        *self.records.lock() = 0;
    }

    pub fn stats(&self) -> FileCacheStats {
        let files = self.files.lock();
        FileCacheStats {
            files: files.len(),
            records: *self.records.lock(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
