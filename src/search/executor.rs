use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use log::debug;
use rayon::prelude::*;
use crate::core::database::Catalog;
use crate::core::error::Result;
use crate::query::ast::{BoundTable, ResolvedQuery};
use crate::query::matcher::{matches_single, TupleMatcher};
use crate::query::resolver::{station_filter, StationFilter};
use crate::schema::record::{Provenance, Record};
use crate::schema::schema::TableSchema;
use crate::search::results::QueryRow;
use crate::storage::flat_file::FlatFileReader;
use crate::storage::layout::StorageLayout;
use crate::storage::static_cache::{annotate_channel, station_key, RecordSet};
use crate::storage::walker::{list_subdirs, list_table_files, PartitionWalker};

/// Receives accepted rows. Returning `Break` ends the scan.
pub trait RowSink {
    fn push(&mut self, row: QueryRow) -> Result<ControlFlow<()>>;
}

impl RowSink for Vec<QueryRow> {
    fn push(&mut self, row: QueryRow) -> Result<ControlFlow<()>> {
        Vec::push(self, row);
        Ok(ControlFlow::Continue(()))
    }
}

/// Runs one resolved query against the catalog's files.
pub struct QueryExecutor {
    catalog: Arc<Catalog>,
    query: ResolvedQuery,
}

impl QueryExecutor {
    pub fn new(catalog: Arc<Catalog>, query: ResolvedQuery) -> Self {
        QueryExecutor { catalog, query }
    }

    pub fn query(&self) -> &ResolvedQuery {
        &self.query
    }

    /// Scan every candidate record and push each accepted row, in
    /// directory, file, line, then join order. `stop` is polled between
    /// directories and records; a raised flag ends the scan with `Break`.
    pub fn run(&self, sink: &mut dyn RowSink, stop: &AtomicBool) -> Result<ControlFlow<()>> {
        let mut secondaries = Vec::with_capacity(self.query.tables.len().saturating_sub(1));
        for index in 1..self.query.tables.len() {
            let records = self.load_table(index, stop)?;
            debug!("{} pre-filtered to {} records", self.query.tables[index].name(), records.len());
            if records.is_empty() {
                return Ok(ControlFlow::Continue(()));
            }
            secondaries.push(records);
        }

        let join_constraints: Vec<_> = self
            .query
            .constraints
            .iter()
            .filter(|c| {
                let tables = c.tables();
                !(tables.len() == 1 && tables.first().is_some_and(|&t| t > 0))
            })
            .cloned()
            .collect();
        let mut scan = Scan {
            matcher: TupleMatcher::new(&join_constraints, self.query.tables.len()),
            secondaries: &secondaries,
            distinct: self.query.parsed.distinct,
            sink,
        };

        let primary = self.query.primary();
        if let Some(records) = self.load_static(primary)? {
            debug!("scanning static {} ({} records)", primary.name(), records.len());
            for record in records.iter() {
                if stop.load(Ordering::Relaxed) {
                    return Ok(ControlFlow::Break(()));
                }
                if scan.offer(record, &mut || record.clone())?.is_break() {
                    return Ok(ControlFlow::Break(()));
                }
            }
            return Ok(ControlFlow::Continue(()));
        }

        let stations = station_filter(&self.query, &secondaries);
        if stations.is_some() {
            debug!("station filter {:?}", stations);
        }
        let schema = &primary.schema;
        self.walk_files(0, stations.as_ref(), stop, &mut |file, base| {
            self.for_each_record(file, schema, stop, &mut |record, offset| {
                scan.offer(record, &mut || stamped(record, base, offset))
            })
        })
    }

    fn load_static(&self, table: &BoundTable) -> Result<Option<RecordSet>> {
        match self.catalog.static_source(table.name()) {
            Some((path, overlay)) => {
                let records = self.catalog.static_cache.load(&table.schema, &path, overlay.as_deref())?;
                Ok(Some(records))
            }
            None => Ok(None),
        }
    }

    /// Records of secondary table `index` that pass its own constraints,
    /// from the static cache or else from its directory tree.
    fn load_table(&self, index: usize, stop: &AtomicBool) -> Result<RecordSet> {
        let table = &self.query.tables[index];
        let local = TupleMatcher::local_to(&self.query.constraints, index);

        if let Some(all) = self.load_static(table)? {
            if local.is_empty() {
                return Ok(all);
            }
            let kept: Vec<Arc<Record>> = all
                .par_iter()
                .filter(|r| local.iter().all(|c| matches_single(c, index, r)))
                .cloned()
                .collect();
            return Ok(Arc::new(kept));
        }

        let annotate = table.name().eq_ignore_ascii_case("sitechan");
        let mut kept = Vec::new();
        let flow = self.walk_files(index, None, stop, &mut |file, base| {
            self.for_each_record(file, &table.schema, stop, &mut |record, offset| {
                if local.iter().all(|c| matches_single(c, index, record)) {
                    let mut owned = record.clone();
                    if annotate {
                        annotate_channel(&mut owned);
                    }
                    owned.set_provenance(Arc::new(Provenance { offset, ..base.clone() }));
                    kept.push(Arc::new(owned));
                }
                Ok(ControlFlow::Continue(()))
            })
        })?;
        if flow.is_break() {
            debug!("loading {} interrupted", table.name());
        }
        if annotate {
            kept.sort_by_cached_key(|r| station_key(r));
        }
        Ok(Arc::new(kept))
    }

    /// Directories to walk for `table`: one per station under the segment
    /// root for the row table, otherwise the author's directory.
    fn roots(&self, table: &BoundTable, stations: Option<&StationFilter>) -> Result<Vec<PathBuf>> {
        let layout = &self.catalog.layout;
        match &layout.seg_root {
            Some(seg_root) if table.name().eq_ignore_ascii_case(&self.catalog.config.row_table) => {
                Ok(list_subdirs(seg_root)?
                    .into_iter()
                    .filter(|(station, _)| stations.is_none_or(|f| f.admits(station)))
                    .map(|(_, dir)| dir)
                    .collect())
            }
            _ => Ok(vec![layout.author_dir(&table.author)]),
        }
    }

    /// Visit every file of table `index` in partitions meeting its window.
    fn walk_files(
        &self,
        index: usize,
        stations: Option<&StationFilter>,
        stop: &AtomicBool,
        visit: &mut dyn FnMut(&Path, &Provenance) -> Result<ControlFlow<()>>,
    ) -> Result<ControlFlow<()>> {
        let table = &self.query.tables[index];
        let structure = &self.catalog.structure;
        let walker = PartitionWalker::new(structure, self.catalog.config.dir_duration, table.window);
        let described: Arc<str> = structure.describe().into();
        let author: Arc<str> = table.author.as_str().into();
        let table_name: Arc<str> = table.name().into();

        for root in self.roots(table, stations)? {
            let flow = walker.walk(&root, &|| stop.load(Ordering::Relaxed), &mut |dir, _start| {
                let dir_name: Arc<str> = dir.display().to_string().into();
                for file in list_table_files(dir, table.name())? {
                    if stop.load(Ordering::Relaxed) {
                        return Ok(ControlFlow::Break(()));
                    }
                    let prefix = StorageLayout::split_table_file(&file).map(|(p, _)| p).unwrap_or("");
                    let base = Provenance {
                        dir: dir_name.clone(),
                        prefix: prefix.into(),
                        file: file.as_path().into(),
                        format: "css",
                        author: author.clone(),
                        table: table_name.clone(),
                        structure: Some(described.clone()),
                        offset: 0,
                    };
                    if visit(&file, &base)?.is_break() {
                        return Ok(ControlFlow::Break(()));
                    }
                }
                Ok(ControlFlow::Continue(()))
            })?;
            if flow.is_break() {
                return Ok(flow);
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Feed each `(record, offset)` of `path` to `f`, from the file cache
    /// when the file is small enough to be held there.
    fn for_each_record(
        &self,
        path: &Path,
        schema: &Arc<TableSchema>,
        stop: &AtomicBool,
        f: &mut dyn FnMut(&Record, u64) -> Result<ControlFlow<()>>,
    ) -> Result<ControlFlow<()>> {
        if let Some(rows) = self.catalog.file_cache.read(path, schema)? {
            for (offset, record) in rows.iter() {
                if stop.load(Ordering::Relaxed) || f(record, *offset)?.is_break() {
                    return Ok(ControlFlow::Break(()));
                }
            }
            return Ok(ControlFlow::Continue(()));
        }

        let Some(reader) = FlatFileReader::open(path, schema.clone())? else {
            return Ok(ControlFlow::Continue(()));
        };
        for item in reader {
            let (offset, record) = item?;
            if stop.load(Ordering::Relaxed) || f(&record, offset)?.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    }
}

fn stamped(record: &Record, base: &Provenance, offset: u64) -> Arc<Record> {
    let mut owned = record.clone();
    owned.set_provenance(Arc::new(Provenance { offset, ..base.clone() }));
    Arc::new(owned)
}

struct Scan<'a, 's> {
    matcher: TupleMatcher,
    secondaries: &'a [RecordSet],
    distinct: bool,
    sink: &'s mut dyn RowSink,
}

impl Scan<'_, '_> {
    /// Join one primary candidate against the secondary sets. `make`
    /// produces the stamped primary the first time a tuple is accepted.
    fn offer(&mut self, record: &Record, make: &mut dyn FnMut() -> Arc<Record>) -> Result<ControlFlow<()>> {
        if !self.matcher.accepts(0, &[record]) {
            return Ok(ControlFlow::Continue(()));
        }

        let secondaries = self.secondaries;
        let distinct = self.distinct;
        let sink = &mut *self.sink;
        let mut primary: Option<Arc<Record>> = None;
        let mut halted = false;
        let mut emit = |picks: &[usize]| -> Result<ControlFlow<()>> {
            let row = QueryRow {
                primary: primary.get_or_insert_with(&mut *make).clone(),
                joined: picks
                    .iter()
                    .enumerate()
                    .map(|(table, &i)| secondaries[table][i].clone())
                    .collect(),
            };
            if sink.push(row)?.is_break() {
                halted = true;
                return Ok(ControlFlow::Break(()));
            }
            // distinct rows stop at the first satisfying tuple
            Ok(if distinct { ControlFlow::Break(()) } else { ControlFlow::Continue(()) })
        };

        let mut tuple = vec![record];
        let mut picks = Vec::with_capacity(secondaries.len());
        join(1, secondaries, &self.matcher, &mut tuple, &mut picks, &mut emit)?;
        Ok(if halted { ControlFlow::Break(()) } else { ControlFlow::Continue(()) })
    }
}

/// Nested-loop cross product over `secondaries[level - 1..]`, checking each
/// level's constraints as soon as its record is chosen.
fn join<'r>(
    level: usize,
    secondaries: &'r [RecordSet],
    matcher: &TupleMatcher,
    tuple: &mut Vec<&'r Record>,
    picks: &mut Vec<usize>,
    emit: &mut dyn FnMut(&[usize]) -> Result<ControlFlow<()>>,
) -> Result<ControlFlow<()>> {
    if level > secondaries.len() {
        return emit(picks);
    }
    for (i, record) in secondaries[level - 1].iter().enumerate() {
        tuple.push(record);
        picks.push(i);
        let flow = if matcher.accepts(level, tuple) {
            join(level + 1, secondaries, matcher, tuple, picks, emit)?
        } else {
            ControlFlow::Continue(())
        };
        tuple.pop();
        picks.pop();
        if flow.is_break() {
            return Ok(flow);
        }
    }
    Ok(ControlFlow::Continue(()))
}
