use std::path::{Path, PathBuf};
use crate::core::config::Config;

/// On-disk locations of every kind of table file.
///
/// ```text
/// <param_root>/static/global.<table>                  static tables
/// <param_root>/<author>/<partition>/<prefix>.<table>  per-author tables
/// <seg_root>/<station>/<partition>/<prefix>.<table>   row table
/// <fallback_root>/tables/static/global.<table>        fallback statics
/// ```
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub param_root: PathBuf,
    pub seg_root: Option<PathBuf>,
    pub fallback_root: Option<PathBuf>,
    id_table: String,
}

impl StorageLayout {
    pub fn new(config: &Config) -> Self {
        StorageLayout {
            param_root: config.param_root.clone(),
            seg_root: config.seg_root.clone(),
            fallback_root: config.fallback_root.clone(),
            id_table: config.id_table.to_ascii_lowercase(),
        }
    }

    pub fn static_path(&self, table: &str) -> PathBuf {
        self.param_root.join("static").join(global_name(table))
    }

    /// The fallback root keeps the id counter table with the dynamic tables.
    pub fn fallback_static_path(&self, table: &str) -> Option<PathBuf> {
        let kind = if table.eq_ignore_ascii_case(&self.id_table) { "dynamic" } else { "static" };
        self.fallback_root
            .as_ref()
            .map(|root| root.join("tables").join(kind).join(global_name(table)))
    }

    /// Existing static file for `table`, in search order.
    pub fn find_static(&self, table: &str) -> Option<PathBuf> {
        std::iter::once(self.static_path(table))
            .chain(self.fallback_static_path(table))
            .find(|p| p.is_file())
    }

    pub fn author_dir(&self, author: &str) -> PathBuf {
        self.param_root.join(author)
    }

    pub fn station_dir(&self, station: &str) -> Option<PathBuf> {
        self.seg_root.as_ref().map(|root| root.join(station))
    }

    pub fn table_file(dir: &Path, prefix: &str, table: &str) -> PathBuf {
        dir.join(format!("{}.{}", prefix, table))
    }

    /// Splits `<prefix>.<table>` at the last dot.
    pub fn split_table_file(path: &Path) -> Option<(&str, &str)> {
        path.file_name()?.to_str()?.rsplit_once('.')
    }
}

fn global_name(table: &str) -> String {
    format!("global.{}", table.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_paths() {
        let mut config = Config::new("/data/param");
        config.fallback_root = Some(PathBuf::from("/opt/geo"));
        let layout = StorageLayout::new(&config);
        assert_eq!(layout.static_path("Site"), PathBuf::from("/data/param/static/global.site"));
        assert_eq!(
            layout.fallback_static_path("lastid"),
            Some(PathBuf::from("/opt/geo/tables/dynamic/global.lastid"))
        );
        assert_eq!(
            layout.fallback_static_path("site"),
            Some(PathBuf::from("/opt/geo/tables/static/global.site"))
        );
    }

    #[test]
    fn table_file_names() {
        let path = StorageLayout::table_file(Path::new("/p/idc/2004/01/05"), "ev1", "origin");
        assert_eq!(path, PathBuf::from("/p/idc/2004/01/05/ev1.origin"));
        assert_eq!(StorageLayout::split_table_file(&path), Some(("ev1", "origin")));
    }
}
