pub mod core;
pub mod schema;
pub mod query;
pub mod storage;
pub mod search;

pub use crate::core::config::Config;
pub use crate::core::database::FFDatabase;
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::types::{FieldValue, TimeWindow};
pub use crate::schema::{Record, SchemaRegistry, TableSchema};
pub use crate::search::{Fetch, QueryRow, QuerySession, SessionState};
pub use crate::storage::StaticTableCache;

/*
┌──────────────────────────────────── FFDB QUERY PATH ─────────────────────────────────────┐
│                                                                                          │
│  "select o.* from idc.origin o, arrival a where a.time >= o.time - 600"                  │
│        │                                                                                 │
│        ▼                                                                                 │
│  QueryParser ──► ParsedQuery { tables[0] = primary, constraints }                        │
│        │                                                                                 │
│        ▼                                                                                 │
│  Resolver ──► ResolvedQuery { BoundTable { schema, author, window }, BoundConstraint }   │
│        │                                                                                 │
│        ▼                                                                                 │
│  FFDatabase::query ──► QuerySession ──spawn──► worker thread                             │
│                          │    ▲                    │                                     │
│                   go(n)  │    │ ready(batch)       ▼                                     │
│                          ▼    │              QueryExecutor                               │
│                     (rendezvous channels)      ├─ secondaries: StaticTableCache          │
│                                                │    or PartitionWalker + prefilter       │
│                                                ├─ primary: PartitionWalker               │
│                                                │    └─ FileCache / FlatFileReader        │
│                                                └─ join: TupleMatcher per level           │
│                                                                                          │
└──────────────────────────────────────────────────────────────────────────────────────────┘

On disk:
  <param_root>/static/global.<table>
  <param_root>/<author>/<partition>/<prefix>.<table>
  <seg_root>/<station>/<partition>/<prefix>.<row table>
*/
