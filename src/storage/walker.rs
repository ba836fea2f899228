use std::fs;
use std::io;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use log::trace;
use crate::core::error::{Error, Result};
use crate::core::types::TimeWindow;
use crate::storage::layout::StorageLayout;
use crate::storage::partition::DirStructure;

/// Sorted subdirectories of `dir`, skipping hidden entries and the legacy
/// `" "`-prefixed sentinel. A missing directory, or a path that turns out
/// to be a file, lists as empty.
pub fn list_subdirs(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if is_skippable(&e) => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(e, dir.display())),
    };
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(e, dir.display()))?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.starts_with('.') || name.starts_with(' ') {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            dirs.push((name, path));
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Sorted `<prefix>.<table>` files directly inside `dir`.
pub fn list_table_files(dir: &Path, table: &str) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if is_skippable(&e) => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(e, dir.display())),
    };
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::io(e, dir.display()))?.path();
        let is_table = StorageLayout::split_table_file(&path)
            .is_some_and(|(prefix, t)| !prefix.starts_with('.') && t.eq_ignore_ascii_case(table));
        if is_table && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub(crate) fn is_skippable(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::NotFound || e.raw_os_error() == Some(libc::ENOTDIR)
}

/// Time-pruned descent through a partitioned directory tree.
pub struct PartitionWalker<'a> {
    structure: &'a DirStructure,
    duration: f64,
    window: TimeWindow,
}

impl<'a> PartitionWalker<'a> {
    pub fn new(structure: &'a DirStructure, duration: f64, window: TimeWindow) -> Self {
        PartitionWalker { structure, duration, window }
    }

    /// Call `visit(dir, start)` for every leaf partition under `root` whose
    /// span `[start, start + duration]` meets the window, in name order.
    ///
    /// `should_stop` is checked before each directory is listed; a stop or a
    /// `Break` from `visit` ends the walk early with `Break`.
    pub fn walk<F>(&self, root: &Path, should_stop: &dyn Fn() -> bool, visit: &mut F) -> Result<ControlFlow<()>>
    where
        F: FnMut(&Path, f64) -> Result<ControlFlow<()>>,
    {
        let mut components = Vec::with_capacity(self.structure.levels());
        self.descend(root, &mut components, should_stop, visit)
    }

    fn descend<F>(
        &self,
        dir: &Path,
        components: &mut Vec<String>,
        should_stop: &dyn Fn() -> bool,
        visit: &mut F,
    ) -> Result<ControlFlow<()>>
    where
        F: FnMut(&Path, f64) -> Result<ControlFlow<()>>,
    {
        if should_stop() {
            return Ok(ControlFlow::Break(()));
        }
        let leaf_level = components.len() + 1 == self.structure.levels();
        for (name, path) in list_subdirs(dir)? {
            components.push(name);
            let flow = if leaf_level {
                self.visit_leaf(&path, components, visit)?
            } else {
                self.descend(&path, components, should_stop, visit)?
            };
            components.pop();
            if flow.is_break() {
                return Ok(flow);
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    fn visit_leaf<F>(&self, path: &Path, components: &[String], visit: &mut F) -> Result<ControlFlow<()>>
    where
        F: FnMut(&Path, f64) -> Result<ControlFlow<()>>,
    {
        let names: Vec<&str> = components.iter().map(String::as_str).collect();
        let Some(start) = self.structure.parse(&names) else {
            trace!("skipping non-partition directory {}", path.display());
            return Ok(ControlFlow::Continue(()));
        };
        if !self.window.admits_partition(start, self.duration) {
            trace!("pruned {}", path.display());
            return Ok(ControlFlow::Continue(()));
        }
        trace!("visiting {}", path.display());
        visit(path, start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DAY: f64 = 86400.0;
    const JAN_05: f64 = 1073260800.0;

    fn tree(dirs: &[&str]) -> TempDir {
        let root = TempDir::new().unwrap();
        for d in dirs {
            fs::create_dir_all(root.path().join(d)).unwrap();
        }
        root
    }

    fn visited(root: &Path, structure: &DirStructure, window: TimeWindow) -> Vec<f64> {
        let mut starts = Vec::new();
        PartitionWalker::new(structure, DAY, window)
            .walk(root, &|| false, &mut |_, start| {
                starts.push(start);
                Ok(ControlFlow::Continue(()))
            })
            .unwrap();
        starts
    }

    #[test]
    fn prunes_by_window() {
        let root = tree(&["2004/01/05", "2004/01/06", "2004/01/07", "2004/01/notes", ".hidden/01/05"]);
        let s = DirStructure::from_pattern(Some("%Y/%m/%d")).unwrap();
        let window = TimeWindow::new(JAN_05 + DAY + 1.0, JAN_05 + 2.0 * DAY);
        assert_eq!(visited(root.path(), &s, window), vec![JAN_05 + DAY, JAN_05 + 2.0 * DAY]);
        // a partition ending exactly at tmin still overlaps the window
        let window = TimeWindow::new(JAN_05 + DAY, JAN_05 + DAY);
        assert_eq!(visited(root.path(), &s, window), vec![JAN_05, JAN_05 + DAY]);
        assert_eq!(visited(root.path(), &s, TimeWindow::unbounded()).len(), 3);
    }

    #[test]
    fn files_and_missing_roots_are_not_errors() {
        let root = tree(&["20040105"]);
        fs::write(root.path().join("20040106"), "not a dir").unwrap();
        let s = DirStructure::DaySuffix;
        assert_eq!(visited(root.path(), &s, TimeWindow::unbounded()), vec![JAN_05]);
        assert!(visited(&root.path().join("missing"), &s, TimeWindow::unbounded()).is_empty());
        assert!(visited(&root.path().join("20040106"), &s, TimeWindow::unbounded()).is_empty());
    }

    #[test]
    fn lists_only_matching_table_files() {
        let root = tree(&["p"]);
        let dir = root.path().join("p");
        for name in ["b.origin", "a.origin", "a.arrival", ".x.origin", "README"] {
            fs::write(dir.join(name), "").unwrap();
        }
        let files = list_table_files(&dir, "ORIGIN").unwrap();
        assert_eq!(files, vec![dir.join("a.origin"), dir.join("b.origin")]);
        assert!(list_table_files(&dir.join("README"), "origin").unwrap().is_empty());
    }

    #[test]
    fn stop_flag_ends_walk() {
        let root = tree(&["20040105", "20040106"]);
        let flow = PartitionWalker::new(&DirStructure::DaySuffix, DAY, TimeWindow::unbounded())
            .walk(root.path(), &|| true, &mut |_, _| panic!("visited after stop"))
            .unwrap();
        assert!(flow.is_break());
    }
}
