use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use crate::core::error::{Error, Result};
use crate::schema::record::Record;
use crate::schema::schema::TableSchema;
use crate::storage::layout::StorageLayout;
use crate::storage::walker::is_skippable;

/// Lazily decodes one flat file, yielding `(byte offset, record)` per line.
pub struct FlatFileReader {
    schema: Arc<TableSchema>,
    path: PathBuf,
    reader: BufReader<File>,
    line: String,
    offset: u64,
    line_no: usize,
}

impl FlatFileReader {
    /// `Ok(None)` when the path is missing or sits under a plain file.
    pub fn open(path: &Path, schema: Arc<TableSchema>) -> Result<Option<Self>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if is_skippable(&e) => return Ok(None),
            Err(e) => return Err(Error::io(e, path.display())),
        };
        Ok(Some(FlatFileReader {
            schema,
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            line: String::new(),
            offset: 0,
            line_no: 0,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file; missing files read as empty.
    pub fn read_all(path: &Path, schema: Arc<TableSchema>) -> Result<Vec<(u64, Record)>> {
        match FlatFileReader::open(path, schema)? {
            Some(reader) => reader.collect(),
            None => Ok(Vec::new()),
        }
    }
}

impl Iterator for FlatFileReader {
    type Item = Result<(u64, Record)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line.clear();
            let offset = self.offset;
            let n = match self.reader.read_line(&mut self.line) {
                Ok(0) => return None,
                Ok(n) => n,
                Err(e) => return Some(Err(Error::io(e, self.path.display()))),
            };
            self.offset += n as u64;
            self.line_no += 1;
            if self.line.trim().is_empty() {
                continue;
            }
            let record = Record::from_line(self.schema.clone(), &self.line).map_err(|e| {
                Error::scan(format!("{}:{}: {}", self.path.display(), self.line_no, e.context))
            });
            return Some(record.map(|r| (offset, r)));
        }
    }
}

/// Offset-append writer for table files. There is no log or locking; a
/// failed append can leave a partial line behind.
pub struct FlatFileWriter;

impl FlatFileWriter {
    /// Append `records` to `<dir>/<prefix>.<table>`, creating directories
    /// as needed. All records must belong to the same table.
    pub fn append(dir: &Path, prefix: &str, records: &[Record]) -> Result<PathBuf> {
        let first = records
            .first()
            .ok_or_else(|| Error::invalid_argument("no records to append"))?;
        let table = first.table_name();
        if let Some(other) = records.iter().find(|r| !r.table_name().eq_ignore_ascii_case(table)) {
            return Err(Error::invalid_argument(format!(
                "cannot append {} records to a {} file",
                other.table_name(),
                table
            )));
        }

        fs::create_dir_all(dir).map_err(|e| Error::io(e, dir.display()))?;
        let path = StorageLayout::table_file(dir, prefix, table);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::io(e, path.display()))?;
        let mut out = BufWriter::new(file);
        for record in records {
            writeln!(out, "{}", record.write_line()?).map_err(|e| Error::io(e, path.display()))?;
        }
        out.flush().map_err(|e| Error::io(e, path.display()))?;
        Ok(path)
    }
}
