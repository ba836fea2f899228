use std::sync::Arc;
use crate::core::types::FieldValue;
use crate::query::ast::ColumnBinding;
use crate::schema::record::Record;

/// One accepted join tuple: the primary record plus the secondary records
/// it was joined with, in `from` order.
#[derive(Debug, Clone)]
pub struct QueryRow {
    pub primary: Arc<Record>,
    pub joined: Vec<Arc<Record>>,
}

impl QueryRow {
    pub fn record(&self, table: usize) -> Option<&Arc<Record>> {
        match table {
            0 => Some(&self.primary),
            n => self.joined.get(n - 1),
        }
    }

    /// Values of the selected columns.
    pub fn project(&self, projection: &[ColumnBinding]) -> Vec<FieldValue> {
        projection
            .iter()
            .filter_map(|b| self.record(b.table)?.get(b.column).cloned())
            .collect()
    }
}

/// Result of one `fetch`.
#[derive(Debug, Clone, Default)]
pub struct Fetch {
    pub rows: Vec<QueryRow>,
    pub done: bool,
}

impl Fetch {
    pub fn count(&self) -> usize {
        self.rows.len()
    }
}
