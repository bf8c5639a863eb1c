//! Semantic actions produced by reconciliation.
//!
//! `Action` is a closed set of variants. Correlation code asks for a typed
//! view (`as_move_file`, `as_delete_folder`, ...) instead of probing fields,
//! so every branch of the analyzer is an exhaustive match.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::reconcile::event::{Identity, Stats};

/// Payload of actions that create or update an entry in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Path of the entry.
    pub path: PathBuf,
    /// Inode of the entry, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ino: Option<u64>,
    /// Stats at the time of the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
    /// Content checksum (files only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Incomplete; deferred to the next cycle.
    #[serde(default, skip_serializing_if = "is_false")]
    pub wip: bool,
}

/// Payload of delete actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Removal {
    /// Path the entry had before it was removed.
    pub path: PathBuf,
    /// Inode the entry had, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ino: Option<u64>,
    /// Incomplete; deferred to the next cycle.
    #[serde(default, skip_serializing_if = "is_false")]
    pub wip: bool,
}

impl Removal {
    /// Identity of the removed entry.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity::new(self.path.clone(), self.ino)
    }
}

/// Payload of move actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Move {
    /// Destination path.
    pub path: PathBuf,
    /// Inode of the moved entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ino: Option<u64>,
    /// Stats at the destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
    /// Content checksum at the destination (files only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Identity before the move.
    pub old: Identity,
    /// Incomplete; deferred to the next cycle.
    #[serde(default, skip_serializing_if = "is_false")]
    pub wip: bool,
    /// The entry moved independently inside an ancestor move and must be
    /// re-validated by the executor.
    #[serde(default, skip_serializing_if = "is_false")]
    pub need_refetch: bool,
}

fn is_false(value: &bool) -> bool {
    !value
}

/// A semantic change to replay remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    /// A new file.
    AddFile(Entry),
    /// A new (or updated) folder.
    PutFolder(Entry),
    /// Content change of an existing file.
    UpdateFile(Entry),
    /// A file was removed.
    DeleteFile(Removal),
    /// A folder was removed.
    DeleteFolder(Removal),
    /// A file was renamed or moved.
    MoveFile(Move),
    /// A folder was renamed or moved.
    MoveFolder(Move),
}

impl Action {
    /// Variant name, as used in the serialized `type` tag.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Action::AddFile(_) => "AddFile",
            Action::PutFolder(_) => "PutFolder",
            Action::UpdateFile(_) => "UpdateFile",
            Action::DeleteFile(_) => "DeleteFile",
            Action::DeleteFolder(_) => "DeleteFolder",
            Action::MoveFile(_) => "MoveFile",
            Action::MoveFolder(_) => "MoveFolder",
        }
    }

    /// Short human readable description for logs and diagnostics.
    #[must_use]
    pub fn describe(&self) -> String {
        let wip = if self.is_wip() { " (wip)" } else { "" };
        match self.as_move() {
            Some(mv) => format!(
                "{} {:?} -> {:?}{wip}",
                self.kind_name(),
                mv.old.path,
                mv.path
            ),
            None => format!("{} {:?}{wip}", self.kind_name(), self.path()),
        }
    }

    /// Current path: destination for moves, former path for deletes.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Action::AddFile(entry) | Action::PutFolder(entry) | Action::UpdateFile(entry) => {
                &entry.path
            }
            Action::DeleteFile(removal) | Action::DeleteFolder(removal) => &removal.path,
            Action::MoveFile(mv) | Action::MoveFolder(mv) => &mv.path,
        }
    }

    /// Inode key of the action, if it has a usable one.
    #[must_use]
    pub fn ino(&self) -> Option<u64> {
        let ino = match self {
            Action::AddFile(entry) | Action::PutFolder(entry) | Action::UpdateFile(entry) => {
                entry.ino
            }
            Action::DeleteFile(removal) | Action::DeleteFolder(removal) => removal.ino,
            Action::MoveFile(mv) | Action::MoveFolder(mv) => mv.ino,
        };
        ino.filter(|ino| *ino != 0)
    }

    /// Whether the action is still incomplete.
    #[must_use]
    pub fn is_wip(&self) -> bool {
        match self {
            Action::AddFile(entry) | Action::PutFolder(entry) | Action::UpdateFile(entry) => {
                entry.wip
            }
            Action::DeleteFile(removal) | Action::DeleteFolder(removal) => removal.wip,
            Action::MoveFile(mv) | Action::MoveFolder(mv) => mv.wip,
        }
    }

    /// Marks the action as complete or incomplete.
    pub fn set_wip(&mut self, wip: bool) {
        match self {
            Action::AddFile(entry) | Action::PutFolder(entry) | Action::UpdateFile(entry) => {
                entry.wip = wip;
            }
            Action::DeleteFile(removal) | Action::DeleteFolder(removal) => removal.wip = wip,
            Action::MoveFile(mv) | Action::MoveFolder(mv) => mv.wip = wip,
        }
    }

    /// Path the action brings into existence, if any.
    #[must_use]
    pub fn add_path(&self) -> Option<&Path> {
        match self {
            Action::AddFile(entry) | Action::PutFolder(entry) | Action::UpdateFile(entry) => {
                Some(&entry.path)
            }
            Action::MoveFile(mv) | Action::MoveFolder(mv) => Some(&mv.path),
            Action::DeleteFile(_) | Action::DeleteFolder(_) => None,
        }
    }

    /// Path the action makes disappear, if any.
    #[must_use]
    pub fn del_path(&self) -> Option<&Path> {
        match self {
            Action::DeleteFile(removal) | Action::DeleteFolder(removal) => Some(&removal.path),
            Action::MoveFile(mv) | Action::MoveFolder(mv) => Some(&mv.old.path),
            Action::AddFile(_) | Action::PutFolder(_) | Action::UpdateFile(_) => None,
        }
    }

    /// Whether the action is a file or folder move.
    #[must_use]
    pub fn is_move(&self) -> bool {
        self.as_move().is_some()
    }

    /// Move payload of either move variant.
    #[must_use]
    pub fn as_move(&self) -> Option<&Move> {
        match self {
            Action::MoveFile(mv) | Action::MoveFolder(mv) => Some(mv),
            _ => None,
        }
    }

    /// Mutable move payload of either move variant.
    pub fn as_move_mut(&mut self) -> Option<&mut Move> {
        match self {
            Action::MoveFile(mv) | Action::MoveFolder(mv) => Some(mv),
            _ => None,
        }
    }

    /// Typed view of a file move.
    #[must_use]
    pub fn as_move_file(&self) -> Option<&Move> {
        match self {
            Action::MoveFile(mv) => Some(mv),
            _ => None,
        }
    }

    /// Typed view of a folder move.
    #[must_use]
    pub fn as_move_folder(&self) -> Option<&Move> {
        match self {
            Action::MoveFolder(mv) => Some(mv),
            _ => None,
        }
    }

    /// Typed view of a file deletion.
    #[must_use]
    pub fn as_delete_file(&self) -> Option<&Removal> {
        match self {
            Action::DeleteFile(removal) => Some(removal),
            _ => None,
        }
    }

    /// Typed view of a folder deletion.
    #[must_use]
    pub fn as_delete_folder(&self) -> Option<&Removal> {
        match self {
            Action::DeleteFolder(removal) => Some(removal),
            _ => None,
        }
    }

    /// Typed view of a file addition.
    #[must_use]
    pub fn as_add_file(&self) -> Option<&Entry> {
        match self {
            Action::AddFile(entry) => Some(entry),
            _ => None,
        }
    }

    /// Typed view of a folder creation.
    #[must_use]
    pub fn as_put_folder(&self) -> Option<&Entry> {
        match self {
            Action::PutFolder(entry) => Some(entry),
            _ => None,
        }
    }
}
