use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the parameter (non-waveform) tables: `<param_root>/<author>/...`
    /// and `<param_root>/static/global.<table>`.
    pub param_root: PathBuf,
    /// Root of the row table tree: `<seg_root>/<station>/<partition>/...`.
    pub seg_root: Option<PathBuf>,
    /// Fallback root searched for `tables/static/global.<table>`.
    pub fallback_root: Option<PathBuf>,
    pub default_author: String,

    // Partitioning
    pub dir_structure: Option<String>,         // strftime pattern, e.g. "%Y/%m/%d"
    pub dir_duration: f64,                     // seconds covered by one partition

    pub row_table: String,                     // searched under seg_root
    pub id_table: String,                      // kept under tables/dynamic

    // Limits
    pub memory_cache_records: usize,           // in-memory small-file ceiling
    pub max_tables: usize,                     // tables per query
    pub time_equality_window: f64,             // +/- seconds for `time = x`
}

impl Default for Config {
    fn default() -> Self {
        Config {
            param_root: PathBuf::from("./param"),
            seg_root: None,
            fallback_root: None,
            default_author: "global".to_string(),

            dir_structure: None,
            dir_duration: 86400.0,

            row_table: "wfdisc".to_string(),
            id_table: "lastid".to_string(),

            memory_cache_records: 5000,
            max_tables: 4,
            time_equality_window: 60.0,
        }
    }
}

impl Config {
    pub fn new(param_root: impl Into<PathBuf>) -> Self {
        Config {
            param_root: param_root.into(),
            ..Config::default()
        }
    }

    /// Read a JSON config file; missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&data)?;
        Ok(config)
    }

    /// Overlay the `FFDB_*` environment variables on top of `self`.
    pub fn from_env(mut self) -> Result<Self> {
        if let Ok(root) = env::var("FFDB_PARAM_ROOT") {
            self.param_root = PathBuf::from(root);
        }
        if let Ok(root) = env::var("FFDB_SEG_ROOT") {
            self.seg_root = Some(PathBuf::from(root));
        }
        if let Ok(root) = env::var("FFDB_ROOT") {
            self.fallback_root = Some(PathBuf::from(root));
        }
        if let Ok(author) = env::var("FFDB_AUTHOR") {
            self.default_author = author;
        }
        if let Ok(pattern) = env::var("FFDB_DIR_STRUCTURE") {
            self.dir_structure = if pattern.trim().is_empty() { None } else { Some(pattern) };
        }
        if let Ok(duration) = env::var("FFDB_DIR_DURATION") {
            self.dir_duration = duration.trim().parse().map_err(|_| {
                Error::config(format!("FFDB_DIR_DURATION is not a number: {}", duration))
            })?;
        }
        Ok(self)
    }

    pub fn with_seg_root(mut self, seg_root: impl Into<PathBuf>) -> Self {
        self.seg_root = Some(seg_root.into());
        self
    }

    pub fn with_dir_structure(mut self, pattern: &str, duration: f64) -> Self {
        self.dir_structure = Some(pattern.to_string());
        self.dir_duration = duration;
        self
    }

    pub fn with_author(mut self, author: &str) -> Self {
        self.default_author = author.to_string();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.param_root.is_dir() {
            return Err(Error::config(format!(
                "parameter root {} is not a readable directory",
                self.param_root.display()
            )));
        }
        fs::read_dir(&self.param_root).map_err(|e| {
            Error::config(format!("cannot list {}: {}", self.param_root.display(), e))
        })?;
        if let Some(seg_root) = &self.seg_root {
            if !seg_root.is_dir() {
                return Err(Error::config(format!(
                    "segment root {} is not a directory",
                    seg_root.display()
                )));
            }
        }
        if !(self.dir_duration > 0.0) {
            return Err(Error::config(format!("invalid directory duration {}", self.dir_duration)));
        }
        if self.max_tables == 0 {
            return Err(Error::config("max_tables must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn missing_param_root_is_config_error() {
        let config = Config::new("/definitely/not/here/ffdb");
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
    }

    #[test]
    fn json_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ffdb.json");
        fs::write(&path, r#"{"default_author": "idc", "dir_duration": 3600.0}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.default_author, "idc");
        assert_eq!(config.dir_duration, 3600.0);
        assert_eq!(config.max_tables, 4);
    }

    #[test]
    fn zero_duration_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path()).with_dir_structure("%Y", 0.0);
        assert!(config.validate().is_err());
    }
}
