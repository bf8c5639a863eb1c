//! Raw filesystem notifications as delivered by the watcher.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::Metadata,
    path::{Path, PathBuf},
    str::FromStr,
    time::SystemTime,
};

use serde::{Deserialize, Serialize};

use crate::error::domain::ReconcileError;

/// Kind of a raw filesystem notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "String")]
pub enum EventKind {
    /// A file appeared.
    Add,
    /// A directory appeared.
    AddDir,
    /// A file's content changed.
    Change,
    /// A file disappeared.
    Unlink,
    /// A directory disappeared.
    UnlinkDir,
}

impl EventKind {
    /// Returns the wire name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Add => "add",
            EventKind::AddDir => "addDir",
            EventKind::Change => "change",
            EventKind::Unlink => "unlink",
            EventKind::UnlinkDir => "unlinkDir",
        }
    }

    /// Whether the event removes an entry.
    #[must_use]
    pub fn is_removal(self) -> bool {
        matches!(self, EventKind::Unlink | EventKind::UnlinkDir)
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ReconcileError;

    fn from_str(kind: &str) -> Result<Self, Self::Err> {
        match kind {
            "add" => Ok(EventKind::Add),
            "addDir" => Ok(EventKind::AddDir),
            "change" => Ok(EventKind::Change),
            "unlink" => Ok(EventKind::Unlink),
            "unlinkDir" => Ok(EventKind::UnlinkDir),
            other => Err(ReconcileError::UnrecognizedEvent {
                kind: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for EventKind {
    type Error = ReconcileError;

    fn try_from(kind: String) -> Result<Self, Self::Error> {
        kind.parse()
    }
}

/// Filesystem stats attached to add, addDir and change events.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stats {
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, if the platform reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<SystemTime>,
    /// Whether the entry is a directory.
    #[serde(default)]
    pub is_dir: bool,
}

impl Stats {
    /// Builds stats from filesystem metadata.
    ///
    /// # Arguments
    ///
    /// * `metadata` - Metadata returned by a `stat` call.
    ///
    /// # Returns
    ///
    /// The subset of metadata reconciliation cares about.
    #[must_use]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            size: metadata.len(),
            mtime: metadata.modified().ok(),
            is_dir: metadata.is_dir(),
        }
    }
}

/// Returns the inode of an entry, on platforms that expose one.
#[cfg(unix)]
#[must_use]
pub fn inode_of(metadata: &Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;

    Some(metadata.ino()).filter(|ino| *ino != 0)
}

/// Returns the inode of an entry, on platforms that expose one.
#[cfg(not(unix))]
#[must_use]
pub fn inode_of(_metadata: &Metadata) -> Option<u64> {
    None
}

/// Identity of an entry before it moved or disappeared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Former path.
    pub path: PathBuf,
    /// Former inode, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ino: Option<u64>,
}

impl Identity {
    /// Creates a new identity.
    pub fn new<P: Into<PathBuf>>(path: P, ino: Option<u64>) -> Self {
        Self {
            path: path.into(),
            ino,
        }
    }
}

/// One filesystem notification, annotated by the watcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Notification kind.
    pub kind: EventKind,
    /// Path of the entry. For removals this is the path it had before.
    pub path: PathBuf,
    /// Inode of the entry, when the platform provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ino: Option<u64>,
    /// Stats for add, addDir and change events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
    /// Content checksum for add and change events, once computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Set when the event is known to belong to an unfinished operation.
    #[serde(default)]
    pub wip: bool,
    /// Identity before removal, for unlink events kept for move matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Identity>,
}

impl RawEvent {
    /// Creates a bare event. Removal events get their `old` identity from `path`.
    pub fn new<P: Into<PathBuf>>(kind: EventKind, path: P) -> Self {
        let path = path.into();
        let old = kind.is_removal().then(|| Identity::new(path.clone(), None));
        Self {
            kind,
            path,
            ino: None,
            stats: None,
            checksum: None,
            wip: false,
            old,
        }
    }

    /// Sets the inode (on the event and on its former identity).
    #[must_use]
    pub fn with_ino(mut self, ino: u64) -> Self {
        self.ino = Some(ino);
        if let Some(old) = self.old.as_mut() {
            old.ino = Some(ino);
        }
        self
    }

    /// Sets the filesystem stats.
    #[must_use]
    pub fn with_stats(mut self, stats: Stats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Sets the content checksum.
    #[must_use]
    pub fn with_checksum<S: Into<String>>(mut self, checksum: S) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// Marks the event as part of an unfinished operation.
    #[must_use]
    pub fn in_progress(mut self) -> Self {
        self.wip = true;
        self
    }

    /// Stable identity used for move correlation.
    ///
    /// Inode `0` means "unknown" on every platform we care about.
    #[must_use]
    pub fn inode(&self) -> Option<u64> {
        self.ino
            .or_else(|| self.old.as_ref().and_then(|old| old.ino))
            .filter(|ino| *ino != 0)
    }

    /// Former identity of a removed entry, falling back to the event path.
    #[must_use]
    pub fn former_identity(&self) -> Identity {
        self.old
            .clone()
            .unwrap_or_else(|| Identity::new(self.path.clone(), self.inode()))
    }

    /// Path of the entry.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use serde_json::{from_str, to_string};

    use crate::reconcile::event::{EventKind, RawEvent};

    #[test]
    fn test_event_kind_parsing() {
        assert_eq!("addDir".parse::<EventKind>().unwrap(), EventKind::AddDir);
        assert_eq!("unlink".parse::<EventKind>().unwrap(), EventKind::Unlink);

        let error = "ready".parse::<EventKind>().unwrap_err();
        assert_eq!(error.to_string(), "Unrecognized event kind: ready");
    }

    #[test]
    fn test_unknown_kind_rejected_when_deserializing() {
        let json = r#"{"kind":"raw","path":"/a"}"#;
        let error = from_str::<RawEvent>(json).unwrap_err();
        assert!(error.to_string().contains("Unrecognized event kind: raw"));
    }

    #[test]
    fn test_removal_events_carry_former_identity() {
        let event = RawEvent::new(EventKind::Unlink, "/old/f").with_ino(7);
        let old = event.old.clone().unwrap();
        assert_eq!(old.path, Path::new("/old/f"));
        assert_eq!(old.ino, Some(7));

        let add = RawEvent::new(EventKind::Add, "/new/f");
        assert!(add.old.is_none());
    }

    #[test]
    fn test_zero_inode_is_unknown() {
        let event = RawEvent::new(EventKind::Add, "/f").with_ino(0);
        assert_eq!(event.inode(), None);
    }

    #[test]
    fn test_event_serialization() {
        let event = RawEvent::new(EventKind::UnlinkDir, "/dir").with_ino(3);
        let json = to_string(&event).unwrap();
        assert!(json.contains(r#""kind":"unlinkDir""#));

        let decoded: RawEvent = from_str(&json).unwrap();
        assert_eq!(decoded, event);
    }
}
