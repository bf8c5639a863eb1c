//! Last known inode and kind of every watched entry.
//!
//! Removal notifications arrive after the entry is gone, so its inode and
//! whether it was a directory can only come from what was seen before.

use std::{
    collections::HashMap,
    fs::{Metadata, read_dir},
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    parking_lot::RwLock,
    tracing::{debug, trace},
};

use crate::{error::domain::WatchError, reconcile::event::inode_of};

/// What the index remembers about one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedEntry {
    /// Inode, when the platform reports one.
    pub ino: Option<u64>,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

impl IndexedEntry {
    /// Builds the entry from filesystem metadata.
    #[must_use]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            ino: inode_of(metadata),
            is_dir: metadata.is_dir(),
        }
    }
}

/// Shared path to inode index.
///
/// Cloning yields another handle on the same index.
#[derive(Debug, Clone, Default)]
pub struct InodeIndex {
    entries: Arc<RwLock<HashMap<PathBuf, IndexedEntry>>>,
}

impl InodeIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes everything below `root` (but not `root` itself).
    ///
    /// # Arguments
    ///
    /// * `root` - Directory to walk.
    ///
    /// # Returns
    ///
    /// The number of entries indexed.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::IoError` if `root` cannot be read. Unreadable
    /// subdirectories are skipped.
    pub fn scan(&self, root: &Path) -> Result<usize, WatchError> {
        let found = walk(root)?;
        let count = found.len();

        let mut entries = self.entries.write();
        for (path, metadata) in found {
            entries.insert(path, IndexedEntry::from_metadata(&metadata));
        }
        drop(entries);

        debug!("Indexed {} entries below {:?}", count, root);
        Ok(count)
    }

    /// Records an entry, replacing what was known about its path.
    pub fn insert(&self, path: PathBuf, entry: IndexedEntry) {
        trace!("Indexing {:?} as {:?}", path, entry);
        self.entries.write().insert(path, entry);
    }

    /// Looks up an entry.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<IndexedEntry> {
        self.entries.read().get(path).copied()
    }

    /// Forgets an entry and everything below it.
    ///
    /// # Arguments
    ///
    /// * `path` - Entry that disappeared.
    ///
    /// # Returns
    ///
    /// The forgotten entries, deepest first, ending with `path` itself when
    /// it was indexed.
    pub fn remove_tree(&self, path: &Path) -> Vec<(PathBuf, IndexedEntry)> {
        let mut entries = self.entries.write();
        let below: Vec<PathBuf> = entries
            .keys()
            .filter(|candidate| candidate.starts_with(path) && candidate.as_path() != path)
            .cloned()
            .collect();

        let mut removed: Vec<(PathBuf, IndexedEntry)> = below
            .into_iter()
            .filter_map(|candidate| entries.remove_entry(&candidate))
            .collect();
        removed.sort_by(|(a, _), (b, _)| {
            b.components()
                .count()
                .cmp(&a.components().count())
                .then_with(|| a.cmp(b))
        });

        if let Some(entry) = entries.remove_entry(path) {
            removed.push(entry);
        }
        removed
    }

    /// Number of indexed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Lists everything below `root`, parents before their children.
///
/// Symbolic links are reported as themselves and never followed.
///
/// # Errors
///
/// Returns the error of reading `root` itself.
pub fn walk(root: &Path) -> Result<Vec<(PathBuf, Metadata)>, WatchError> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    let mut first = true;

    while let Some(dir) = pending.pop() {
        let entries = match read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if first => return Err(e.into()),
            Err(e) => {
                debug!("Skipping unreadable directory {:?}: {}", dir, e);
                continue;
            }
        };
        first = false;

        let mut children: Vec<(PathBuf, Metadata)> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                path.symlink_metadata().ok().map(|metadata| (path, metadata))
            })
            .collect();
        children.sort_by(|(a, _), (b, _)| a.cmp(b));

        for (path, metadata) in children {
            if metadata.is_dir() {
                pending.push(path.clone());
            }
            found.push((path, metadata));
        }
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use std::{
        fs::{create_dir_all, write},
        path::PathBuf,
    };

    use tempfile::TempDir;

    use crate::local::watcher::index::{IndexedEntry, InodeIndex, walk};

    fn tree() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        create_dir_all(temp_dir.path().join("a/b")).unwrap();
        write(temp_dir.path().join("a/f"), b"f").unwrap();
        write(temp_dir.path().join("a/b/g"), b"g").unwrap();
        write(temp_dir.path().join("top"), b"t").unwrap();
        temp_dir
    }

    #[test]
    fn test_walk_lists_parents_first() {
        let temp_dir = tree();
        let found: Vec<PathBuf> = walk(temp_dir.path())
            .unwrap()
            .into_iter()
            .map(|(path, _)| path.strip_prefix(temp_dir.path()).unwrap().to_path_buf())
            .collect();

        assert_eq!(found.len(), 5);
        let position = |p: &str| found.iter().position(|f| f == &PathBuf::from(p)).unwrap();
        assert!(position("a") < position("a/b"));
        assert!(position("a") < position("a/f"));
        assert!(position("a/b") < position("a/b/g"));
    }

    #[test]
    fn test_walk_of_missing_root_fails() {
        let temp_dir = TempDir::new().unwrap();
        assert!(walk(&temp_dir.path().join("missing")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_records_inodes_and_kinds() {
        let temp_dir = tree();
        let index = InodeIndex::new();
        assert_eq!(index.scan(temp_dir.path()).unwrap(), 5);

        let dir = index.get(&temp_dir.path().join("a")).unwrap();
        assert!(dir.is_dir);
        assert!(dir.ino.is_some());

        let file = index.get(&temp_dir.path().join("a/f")).unwrap();
        assert!(!file.is_dir);
        assert_ne!(file.ino, dir.ino);
    }

    #[test]
    fn test_remove_tree_returns_deepest_first() {
        let index = InodeIndex::new();
        let entry = |ino, is_dir| IndexedEntry {
            ino: Some(ino),
            is_dir,
        };
        index.insert(PathBuf::from("/w/a"), entry(1, true));
        index.insert(PathBuf::from("/w/a/b"), entry(2, true));
        index.insert(PathBuf::from("/w/a/b/g"), entry(3, false));
        index.insert(PathBuf::from("/w/ab"), entry(4, false));

        let removed: Vec<PathBuf> = index
            .remove_tree(&PathBuf::from("/w/a"))
            .into_iter()
            .map(|(path, _)| path)
            .collect();
        assert_eq!(
            removed,
            vec![
                PathBuf::from("/w/a/b/g"),
                PathBuf::from("/w/a/b"),
                PathBuf::from("/w/a"),
            ]
        );
        assert_eq!(index.len(), 1);
        assert!(index.get(&PathBuf::from("/w/ab")).is_some());
    }
}
