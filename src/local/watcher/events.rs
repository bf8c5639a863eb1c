//! Filesystem changes as reported by `notify`, before annotation.

use std::path::PathBuf;

use notify::{
    Event,
    EventKind::{Create, Modify, Remove},
    event::{ModifyKind, RenameMode},
};

/// A filesystem change reduced to what the annotator needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsChange {
    /// Something appeared at `path` (created or renamed into place).
    Appeared { path: PathBuf },
    /// The content of the file at `path` was written.
    Modified { path: PathBuf },
    /// Whatever was at `path` is gone (deleted or renamed away).
    Vanished { path: PathBuf },
}

impl FsChange {
    /// Path the change is about.
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        match self {
            FsChange::Appeared { path }
            | FsChange::Modified { path }
            | FsChange::Vanished { path } => path,
        }
    }
}

/// Reduces a `notify` event to the changes it describes.
///
/// Renames reported with both ends become a vanish followed by an appear.
/// A rename end of unknown direction is resolved by checking whether the
/// path still exists. Backends that cannot tell what was modified report
/// `Modify(Any)`, which counts as a content change. Access and metadata-only
/// events yield nothing.
#[must_use]
pub fn translate(event: &Event) -> Vec<FsChange> {
    let paths = event.paths.iter().cloned();

    match event.kind {
        Create(_) | Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.map(|path| FsChange::Appeared { path }).collect()
        }
        Modify(ModifyKind::Data(_) | ModifyKind::Any) => {
            paths.map(|path| FsChange::Modified { path }).collect()
        }
        Remove(_) | Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.map(|path| FsChange::Vanished { path }).collect()
        }
        Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => vec![
                FsChange::Vanished { path: from.clone() },
                FsChange::Appeared { path: to.clone() },
            ],
            _ => Vec::new(),
        },
        Modify(ModifyKind::Name(_)) => paths
            .map(|path| {
                if path.symlink_metadata().is_ok() {
                    FsChange::Appeared { path }
                } else {
                    FsChange::Vanished { path }
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}
