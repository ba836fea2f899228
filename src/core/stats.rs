use std::time::SystemTime;
use serde::{Serialize, Deserialize};
use crate::storage::file_cache::FileCacheStats;
use crate::storage::static_cache::StaticCacheStats;

/// Database statistics for monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub uptime_secs: u64,
    pub start_time: SystemTime,

    // Query metrics
    pub queries_started: u64,
    pub queries_rejected: u64,

    // Caches
    pub static_cache: StaticCacheStats,
    pub file_cache: FileCacheStats,
}
