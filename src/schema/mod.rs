pub mod schema;
pub mod record;

pub use record::{Provenance, Record};
pub use schema::{ColumnDef, ColumnType, SchemaRegistry, TableSchema};
