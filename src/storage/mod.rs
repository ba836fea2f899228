pub mod layout;
pub mod partition;
pub mod walker;
pub mod flat_file;
pub mod static_cache;
pub mod file_cache;

pub use file_cache::FileCache;
pub use flat_file::{FlatFileReader, FlatFileWriter};
pub use layout::StorageLayout;
pub use partition::DirStructure;
pub use static_cache::StaticTableCache;
pub use walker::PartitionWalker;
