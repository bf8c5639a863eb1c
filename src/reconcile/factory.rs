//! Builds actions from single events or from correlated event pairs.

use crate::reconcile::{
    action::{Action, Entry, Move, Removal},
    event::{EventKind, RawEvent},
};

/// Which move variant a correlated pair turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    /// `unlink` + `add`.
    File,
    /// `unlinkDir` + `addDir`.
    Folder,
}

/// Builds the plain action matching one event.
///
/// # Arguments
///
/// * `event` - Annotated event.
///
/// # Returns
///
/// `AddFile`, `PutFolder`, `UpdateFile`, `DeleteFile` or `DeleteFolder`.
#[must_use]
pub fn from_event(event: &RawEvent) -> Action {
    match event.kind {
        EventKind::Add => Action::AddFile(entry(event)),
        EventKind::AddDir => Action::PutFolder(Entry {
            checksum: None,
            ..entry(event)
        }),
        EventKind::Change => Action::UpdateFile(entry(event)),
        EventKind::Unlink => Action::DeleteFile(removal(event)),
        EventKind::UnlinkDir => Action::DeleteFolder(removal(event)),
    }
}

fn entry(event: &RawEvent) -> Entry {
    Entry {
        path: event.path.clone(),
        ino: event.inode(),
        stats: event.stats.clone(),
        checksum: event.checksum.clone(),
        wip: event.wip,
    }
}

fn removal(event: &RawEvent) -> Removal {
    let old = event.former_identity();
    Removal {
        path: old.path,
        ino: event.inode(),
        wip: event.wip,
    }
}

/// Builds a move from a deletion seen first and the add event completing it.
///
/// # Arguments
///
/// * `kind` - File or folder move.
/// * `event` - The `add`/`addDir` event (destination side).
/// * `deleted` - The deletion registered earlier for the same inode.
#[must_use]
pub fn move_after_delete(kind: MoveKind, event: &RawEvent, deleted: &Removal) -> Action {
    let mv = Move {
        path: event.path.clone(),
        ino: deleted.ino,
        stats: event.stats.clone(),
        checksum: match kind {
            MoveKind::File => event.checksum.clone(),
            MoveKind::Folder => None,
        },
        old: deleted.identity(),
        wip: event.wip,
        need_refetch: false,
    };
    wrap(kind, mv)
}

/// Builds a move from an addition seen first and the unlink event completing it.
///
/// # Arguments
///
/// * `kind` - File or folder move.
/// * `added` - The addition registered earlier for the same inode.
/// * `event` - The `unlink`/`unlinkDir` event (source side).
#[must_use]
pub fn move_after_add(kind: MoveKind, added: &Entry, event: &RawEvent) -> Action {
    let mv = Move {
        path: added.path.clone(),
        ino: added.ino,
        stats: added.stats.clone(),
        checksum: match kind {
            MoveKind::File => added.checksum.clone(),
            MoveKind::Folder => None,
        },
        old: event.former_identity(),
        wip: added.wip,
        need_refetch: false,
    };
    wrap(kind, mv)
}

fn wrap(kind: MoveKind, mv: Move) -> Action {
    match kind {
        MoveKind::File => Action::MoveFile(mv),
        MoveKind::Folder => Action::MoveFolder(mv),
    }
}
