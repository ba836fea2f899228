pub mod ast;
pub mod parser;
pub mod resolver;
pub mod matcher;

pub use ast::{ParsedQuery, ResolvedQuery};
pub use matcher::TupleMatcher;
pub use parser::QueryParser;
pub use resolver::{Resolver, StationFilter};
