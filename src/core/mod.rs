pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod stats;
pub mod time;
pub mod types;
