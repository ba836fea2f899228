use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime};
use log::{debug, info};
use parking_lot::RwLock;
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::stats::DatabaseStats;
use crate::query::ast::{ParsedQuery, ResolvedQuery};
use crate::query::parser::QueryParser;
use crate::query::resolver::Resolver;
use crate::schema::schema::{SchemaRegistry, TableSchema};
use crate::search::executor::QueryExecutor;
use crate::search::results::QueryRow;
use crate::search::session::QuerySession;
use crate::storage::file_cache::FileCache;
use crate::storage::layout::StorageLayout;
use crate::storage::partition::DirStructure;
use crate::storage::static_cache::{RecordSet, StaticTableCache};

/// Everything a running query needs from its database, shared with the
/// session's worker thread.
pub struct Catalog {
    pub config: Config,
    pub layout: StorageLayout,
    pub structure: DirStructure,
    pub static_cache: Arc<StaticTableCache>,
    pub file_cache: Arc<FileCache>,
    table_paths: RwLock<HashMap<String, (PathBuf, Option<PathBuf>)>>,
}

impl Catalog {
    /// File (and optional overlay) holding `table` as a static table:
    /// a registered path first, then the standard static locations.
    pub fn static_source(&self, table: &str) -> Option<(PathBuf, Option<PathBuf>)> {
        if let Some(registered) = self.table_paths.read().get(&table.to_ascii_lowercase()) {
            return Some(registered.clone());
        }
        self.layout.find_static(table).map(|path| (path, None))
    }
}

pub struct FFDatabase {
    catalog: Arc<Catalog>,
    registry: RwLock<SchemaRegistry>,

    // Metrics
    start_time: Instant,
    started_at: SystemTime,
    queries_started: AtomicU64,
    queries_rejected: AtomicU64,
}

impl FFDatabase {
    /// Open with a private static-table cache.
    pub fn open(config: Config) -> Result<Self> {
        Self::open_with_cache(config, Arc::new(StaticTableCache::new()))
    }

    /// Open sharing `static_cache` with other databases.
    pub fn open_with_cache(config: Config, static_cache: Arc<StaticTableCache>) -> Result<Self> {
        config.validate()?;
        let structure = DirStructure::from_pattern(config.dir_structure.as_deref())?;
        let layout = StorageLayout::new(&config);
        info!(
            "opened {} (structure {}, {} s partitions)",
            config.param_root.display(),
            structure,
            config.dir_duration
        );

        let catalog = Catalog {
            file_cache: Arc::new(FileCache::new(config.memory_cache_records)),
            config,
            layout,
            structure,
            static_cache,
            table_paths: RwLock::new(HashMap::new()),
        };
        Ok(FFDatabase {
            catalog: Arc::new(catalog),
            registry: RwLock::new(SchemaRegistry::builtin()),
            start_time: Instant::now(),
            started_at: SystemTime::now(),
            queries_started: AtomicU64::new(0),
            queries_rejected: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &Config {
        &self.catalog.config
    }

    pub fn static_cache(&self) -> &Arc<StaticTableCache> {
        &self.catalog.static_cache
    }

    pub fn file_cache(&self) -> &Arc<FileCache> {
        &self.catalog.file_cache
    }

    /// Make a table queryable by name, replacing any schema of that name.
    pub fn register_schema(&self, schema: TableSchema) -> Arc<TableSchema> {
        self.registry.write().register(schema)
    }

    pub fn schema(&self, table: &str) -> Option<Arc<TableSchema>> {
        self.registry.read().get(table)
    }

    /// Read `table` from `path` instead of the standard static locations,
    /// with the records of `overlay` (when it exists) appended.
    pub fn register_table_path(&self, table: &str, path: impl Into<PathBuf>, overlay: Option<PathBuf>) {
        self.catalog
            .table_paths
            .write()
            .insert(table.to_ascii_lowercase(), (path.into(), overlay));
    }

    pub fn parse(&self, query: &str) -> Result<ParsedQuery> {
        let registry = self.registry.read();
        QueryParser::new(&registry, self.catalog.config.max_tables).parse(query)
    }

    pub fn resolve(&self, query: &str) -> Result<ResolvedQuery> {
        let registry = self.registry.read();
        let parsed = QueryParser::new(&registry, self.catalog.config.max_tables).parse(query)?;
        Resolver::new(&registry, &self.catalog.config).resolve(parsed)
    }

    /// Parse, resolve and start a query. Nothing is read until the first
    /// `fetch` on the returned session.
    pub fn query(&self, query: &str) -> Result<QuerySession> {
        let resolved = self.resolve(query).inspect_err(|e| {
            self.queries_rejected.fetch_add(1, Ordering::Relaxed);
            debug!("rejected query '{}': {}", query, e);
        })?;
        self.queries_started.fetch_add(1, Ordering::Relaxed);
        QuerySession::start(QueryExecutor::new(self.catalog.clone(), resolved))
    }

    /// Run a query to completion, fetching `batch` rows at a time.
    pub fn query_all(&self, query: &str, batch: usize) -> Result<Vec<QueryRow>> {
        let mut session = self.query(query)?;
        let rows = session.drain(batch)?;
        session.close()?;
        Ok(rows)
    }

    /// Static records of `table`, or `None` when no static file exists.
    pub fn load_static_table(&self, table: &str) -> Result<Option<RecordSet>> {
        let schema = self
            .schema(table)
            .ok_or_else(|| Error::resolve(format!("unknown table: {}", table)))?;
        match self.catalog.static_source(table) {
            Some((path, overlay)) => self
                .catalog
                .static_cache
                .load(&schema, &path, overlay.as_deref())
                .map(Some),
            None => Ok(None),
        }
    }

    pub fn clear_static_cache(&self) {
        self.catalog.static_cache.clear();
    }

    /// `<param_root>/<author>/<partition>` for the partition holding `epoch`.
    pub fn partition_dir(&self, author: &str, epoch: f64) -> Result<PathBuf> {
        Ok(self.catalog.layout.author_dir(author).join(self.partition_path(epoch)?))
    }

    /// `<seg_root>/<station>/<partition>` for the row table.
    pub fn row_partition_dir(&self, station: &str, epoch: f64) -> Result<PathBuf> {
        let station_dir = self
            .catalog
            .layout
            .station_dir(station)
            .ok_or_else(|| Error::config("no segment root configured"))?;
        Ok(station_dir.join(self.partition_path(epoch)?))
    }

    fn partition_path(&self, epoch: f64) -> Result<String> {
        self.catalog
            .structure
            .format(epoch)
            .ok_or_else(|| Error::invalid_argument(format!("cannot place time {} in a partition", epoch)))
    }

    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            uptime_secs: self.start_time.elapsed().as_secs(),
            start_time: self.started_at,
            queries_started: self.queries_started.load(Ordering::Relaxed),
            queries_rejected: self.queries_rejected.load(Ordering::Relaxed),
            static_cache: self.catalog.static_cache.stats(),
            file_cache: self.catalog.file_cache.stats(),
        }
    }
}
