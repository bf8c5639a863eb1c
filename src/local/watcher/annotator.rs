//! Turns filesystem changes into annotated raw events.

use std::{
    collections::HashSet,
    fs::Metadata,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    anyhow::Error,
    async_channel::{Receiver, Sender},
    parking_lot::RwLock,
    tracing::{debug, trace},
};

use crate::{
    checksum::ChecksumQueue,
    error::{ErrorReporter, domain::ChecksumError},
    local::watcher::{
        events::FsChange,
        filter::PathFilter,
        index::{IndexedEntry, InodeIndex, walk},
    },
    reconcile::{EventKind, RawEvent, Stats, event::inode_of},
};

/// Adds inodes, stats and checksums to filesystem changes.
///
/// A directory that appears is reported together with its content, and one
/// that vanishes together with everything that was indexed below it, so a
/// renamed tree shows up as one removal and one addition per entry.
pub struct EventAnnotator {
    index: InodeIndex,
    filter: PathFilter,
    checksums: Arc<ChecksumQueue>,
    roots: Arc<RwLock<HashSet<PathBuf>>>,
}

impl EventAnnotator {
    /// Creates a new annotator.
    ///
    /// # Arguments
    ///
    /// * `index` - Index shared with whoever scans new watched directories.
    /// * `filter` - Filter for ignored paths.
    /// * `checksums` - Queue hashing added and changed files.
    /// * `roots` - Watched directories, used to relativize paths.
    pub fn new(
        index: InodeIndex,
        filter: PathFilter,
        checksums: Arc<ChecksumQueue>,
        roots: Arc<RwLock<HashSet<PathBuf>>>,
    ) -> Self {
        Self {
            index,
            filter,
            checksums,
            roots,
        }
    }

    /// Annotates changes until either channel closes.
    pub async fn start_processing(self, receiver: Receiver<FsChange>, sender: Sender<RawEvent>) {
        while let Ok(change) = receiver.recv().await {
            for event in self.annotate(change).await {
                if sender.send(event).await.is_err() {
                    debug!("Event channel closed, annotator stopping");
                    return;
                }
            }
        }
        debug!("Change channel closed, annotator stopping");
    }

    /// Annotates one change.
    ///
    /// # Returns
    ///
    /// The raw events the change amounts to, possibly none.
    pub async fn annotate(&self, change: FsChange) -> Vec<RawEvent> {
        match change {
            FsChange::Appeared { path } => self.on_appeared(path).await,
            FsChange::Modified { path } => self.on_modified(path).await.into_iter().collect(),
            FsChange::Vanished { path } => self.on_vanished(&path),
        }
    }

    async fn on_appeared(&self, path: PathBuf) -> Vec<RawEvent> {
        let Ok(metadata) = path.symlink_metadata() else {
            trace!("{:?} vanished before it could be examined", path);
            return Vec::new();
        };

        let entry = IndexedEntry::from_metadata(&metadata);
        if self.index.get(&path) == Some(entry) {
            trace!("{:?} is already known", path);
            return Vec::new();
        }

        let mut events = Vec::new();
        let is_dir = metadata.is_dir();
        if let Some(event) = self.entry_event(path.clone(), &metadata).await {
            events.push(event);
        }

        if is_dir {
            let content = walk(&path).unwrap_or_else(|e| {
                debug!("Could not list new directory {:?}: {}", path, e);
                Vec::new()
            });
            for (child, metadata) in content {
                if self.index.get(&child) == Some(IndexedEntry::from_metadata(&metadata)) {
                    continue;
                }
                if let Some(event) = self.entry_event(child, &metadata).await {
                    events.push(event);
                }
            }
        }

        events
    }

    /// Indexes an entry and builds its add or addDir event.
    async fn entry_event(&self, path: PathBuf, metadata: &Metadata) -> Option<RawEvent> {
        self.index
            .insert(path.clone(), IndexedEntry::from_metadata(metadata));
        if self.is_ignored(&path) {
            return None;
        }

        let kind = if metadata.is_dir() {
            EventKind::AddDir
        } else {
            EventKind::Add
        };
        let event = with_inode(RawEvent::new(kind, path), inode_of(metadata))
            .with_stats(Stats::from_metadata(metadata));

        if kind != EventKind::Add {
            return Some(event);
        }

        let path = event.path.clone();
        let event = self.with_checksum(event).await;
        if event.is_none() {
            // Gone before it could be read: its removal must not be reported.
            self.index.remove_tree(&path);
        }
        event
    }

    async fn on_modified(&self, path: PathBuf) -> Option<RawEvent> {
        if self.is_ignored(&path) {
            return None;
        }

        let Ok(metadata) = path.symlink_metadata() else {
            trace!("{:?} vanished before it could be examined", path);
            return None;
        };
        if metadata.is_dir() {
            return None;
        }

        let ino = inode_of(&metadata);
        self.index.insert(path.clone(), IndexedEntry::from_metadata(&metadata));
        let event = with_inode(RawEvent::new(EventKind::Change, path), ino)
            .with_stats(Stats::from_metadata(&metadata));
        self.with_checksum(event).await
    }

    fn on_vanished(&self, path: &Path) -> Vec<RawEvent> {
        let removed = self.index.remove_tree(path);
        if removed.is_empty() {
            trace!("{:?} vanished but was never indexed", path);
        }

        removed
            .into_iter()
            .filter(|(path, _)| !self.is_ignored(path))
            .map(|(path, entry)| {
                let kind = if entry.is_dir {
                    EventKind::UnlinkDir
                } else {
                    EventKind::Unlink
                };
                with_inode(RawEvent::new(kind, path), entry.ino)
            })
            .collect()
    }

    /// Attaches the file checksum, or marks the event in progress when the
    /// file cannot be hashed right now.
    ///
    /// # Returns
    ///
    /// `None` if the file no longer exists, since the event that removed it
    /// is already on its way.
    async fn with_checksum(&self, event: RawEvent) -> Option<RawEvent> {
        match self.checksums.push(&event.path).await {
            Ok(checksum) => Some(event.with_checksum(checksum)),
            Err(ChecksumError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                debug!("{:?} vanished before it could be hashed", event.path);
                None
            }
            Err(e) => {
                let e = Error::new(e).context(format!("Checksum of {:?}", event.path));
                ErrorReporter::warn(&e, "Reporting file as in progress");
                Some(event.in_progress())
            }
        }
    }

    fn is_ignored(&self, path: &Path) -> bool {
        let roots = self.roots.read();
        let relative = roots
            .iter()
            .filter_map(|root| path.strip_prefix(root).ok())
            .min_by_key(|relative| relative.components().count());

        match relative {
            Some(relative) => self.filter.is_ignored(relative),
            None => path
                .file_name()
                .is_some_and(|name| self.filter.is_ignored(Path::new(name))),
        }
    }
}

fn with_inode(event: RawEvent, ino: Option<u64>) -> RawEvent {
    match ino {
        Some(ino) => event.with_ino(ino),
        None => event,
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        fs::{create_dir, remove_file, rename, write},
        io::{Error, ErrorKind, Result},
        path::Path,
        sync::Arc,
    };

    use {parking_lot::RwLock, tempfile::TempDir};

    use crate::{
        checksum::{ChecksumConfig, ChecksumQueue, ChecksumSource},
        local::watcher::{
            WatcherConfig, annotator::EventAnnotator, events::FsChange, filter::PathFilter,
            index::InodeIndex,
        },
        reconcile::EventKind,
    };

    /// Fails on every file whose name starts with "locked", and reports the
    /// ones starting with "gone" as already deleted.
    struct PickySource;

    impl ChecksumSource for PickySource {
        fn checksum(&self, path: &Path) -> Result<String> {
            let name = path.file_name().unwrap().to_string_lossy();
            if name.starts_with("locked") {
                Err(Error::from(ErrorKind::PermissionDenied))
            } else if name.starts_with("gone") {
                Err(Error::from(ErrorKind::NotFound))
            } else {
                Ok(format!("sum-{name}"))
            }
        }
    }

    fn annotator(root: &Path, config: &WatcherConfig) -> (EventAnnotator, InodeIndex) {
        let index = InodeIndex::new();
        index.scan(root).unwrap();
        let roots = Arc::new(RwLock::new(HashSet::from([root.to_path_buf()])));
        let checksums = Arc::new(ChecksumQueue::with_source(
            PickySource,
            ChecksumConfig::default(),
        ));
        let annotator =
            EventAnnotator::new(index.clone(), PathFilter::new(config).unwrap(), checksums, roots);
        (annotator, index)
    }

    #[tokio::test]
    async fn test_new_file_gets_checksum_and_inode() {
        let temp_dir = TempDir::new().unwrap();
        let (annotator, index) = annotator(temp_dir.path(), &WatcherConfig::default());

        let path = temp_dir.path().join("f");
        write(&path, b"content").unwrap();
        let events = annotator.annotate(FsChange::Appeared { path: path.clone() }).await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Add);
        assert_eq!(events[0].checksum.as_deref(), Some("sum-f"));
        assert_eq!(events[0].stats.as_ref().unwrap().size, 7);
        assert!(!events[0].wip);
        assert!(index.get(&path).is_some());

        // A second notification for the same entry adds nothing.
        assert!(annotator.annotate(FsChange::Appeared { path }).await.is_empty());
    }

    #[tokio::test]
    async fn test_unhashable_file_is_in_progress() {
        let temp_dir = TempDir::new().unwrap();
        let (annotator, _) = annotator(temp_dir.path(), &WatcherConfig::default());

        let path = temp_dir.path().join("locked.db");
        write(&path, b"content").unwrap();
        let events = annotator.annotate(FsChange::Modified { path }).await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Change);
        assert!(events[0].checksum.is_none());
        assert!(events[0].wip);
    }

    #[tokio::test]
    async fn test_file_deleted_before_hashing_is_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let (annotator, index) = annotator(temp_dir.path(), &WatcherConfig::default());

        let path = temp_dir.path().join("gone.swp");
        write(&path, b"scratch").unwrap();
        let events = annotator
            .annotate(FsChange::Appeared { path: path.clone() })
            .await;
        assert!(events.is_empty());
        assert!(index.get(&path).is_none());

        // The removal that follows is not reported either.
        remove_file(&path).unwrap();
        assert!(
            annotator
                .annotate(FsChange::Vanished { path })
                .await
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_new_directory_reports_its_content() {
        let temp_dir = TempDir::new().unwrap();
        let (annotator, _) = annotator(temp_dir.path(), &WatcherConfig::default());

        let dir = temp_dir.path().join("d");
        create_dir(&dir).unwrap();
        write(dir.join("x"), b"x").unwrap();
        let events = annotator.annotate(FsChange::Appeared { path: dir }).await;

        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::AddDir, EventKind::Add]);
        assert!(events[1].path.ends_with("d/x"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_renamed_directory_keeps_inodes() {
        let temp_dir = TempDir::new().unwrap();
        let old = temp_dir.path().join("a");
        create_dir(&old).unwrap();
        write(old.join("x"), b"x").unwrap();
        let (annotator, index) = annotator(temp_dir.path(), &WatcherConfig::default());
        let dir_ino = index.get(&old).unwrap().ino;
        let file_ino = index.get(&old.join("x")).unwrap().ino;

        let new = temp_dir.path().join("b");
        rename(&old, &new).unwrap();

        let removed = annotator.annotate(FsChange::Vanished { path: old }).await;
        let kinds: Vec<EventKind> = removed.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Unlink, EventKind::UnlinkDir]);
        assert_eq!(removed[0].ino, file_ino);
        assert_eq!(removed[1].ino, dir_ino);

        let added = annotator.annotate(FsChange::Appeared { path: new }).await;
        assert_eq!(added.len(), 2);
        assert_eq!(added[0].ino, dir_ino);
        assert_eq!(added[1].ino, file_ino);
    }

    #[tokio::test]
    async fn test_hidden_and_unknown_paths_are_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let (annotator, index) = annotator(temp_dir.path(), &WatcherConfig::default());

        let hidden = temp_dir.path().join(".cache");
        write(&hidden, b"h").unwrap();
        let events = annotator
            .annotate(FsChange::Appeared {
                path: hidden.clone(),
            })
            .await;
        assert!(events.is_empty());
        // Still indexed so a later rename to a visible name has its inode.
        assert!(index.get(&hidden).is_some());

        remove_file(&hidden).unwrap();
        assert!(
            annotator
                .annotate(FsChange::Vanished { path: hidden })
                .await
                .is_empty()
        );
        assert!(
            annotator
                .annotate(FsChange::Vanished {
                    path: temp_dir.path().join("never-seen"),
                })
                .await
                .is_empty()
        );
    }
}
