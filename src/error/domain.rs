//! Domain-specific error types using `thiserror`.
//!
//! This module defines the main error enums for the different domains
//! within syncprep: change reconciliation, checksum computation and
//! local filesystem watching.

use std::{io::Error as IoError, path::PathBuf, result::Result as StdResult};

use {anyhow::Error, notify::Error as NotifyError, regex::Error as RegexError, thiserror::Error};

use crate::reconcile::{Action, RawEvent};

/// Fatal reconciliation errors.
///
/// Both variants mean the watcher broke its contract. The current cycle is
/// aborted as a whole and nothing from it is emitted.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// The same inode was observed both as an in-progress move and as a
    /// fresh add/unlink event within one cycle.
    #[error(
        "Double observation of inode {ino}: {} event on {:?} conflicts with {}",
        .event.kind, .event.path, .action.describe()
    )]
    DoubleObservation {
        /// Inode both observations refer to.
        ino: u64,
        /// Offending event.
        event: Box<RawEvent>,
        /// Action already registered for the inode.
        action: Box<Action>,
    },
    /// An event kind outside of the known set was received.
    #[error("Unrecognized event kind: {kind}")]
    UnrecognizedEvent { kind: String },
}

/// Checksum computation errors.
#[derive(Error, Debug)]
pub enum ChecksumError {
    /// Reading the file failed (after retries for busy files).
    #[error("Failed to compute checksum of {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: IoError,
    },
    /// The queue was killed before the request completed.
    #[error("Checksum request for {path:?} was abandoned")]
    Abandoned { path: PathBuf },
    /// The blocking hashing task panicked or was cancelled.
    #[error("Checksum worker failure: {reason}")]
    Worker { reason: String },
}

/// Local watcher errors.
#[derive(Error, Debug)]
pub enum WatchError {
    /// Underlying `notify` failure.
    #[error("Watcher error: {0}")]
    NotifyError(#[from] NotifyError),
    /// Filesystem access failure (initial scan, stat).
    #[error("IO error: {0}")]
    IoError(#[from] IoError),
    /// An ignore pattern could not be compiled.
    #[error("Invalid ignore pattern: {0}")]
    PatternError(#[from] RegexError),
    /// A directory that is not being watched was asked to be unwatched.
    #[error("Directory is not watched: {path:?}")]
    NotWatched { path: PathBuf },
}

/// Operational error context propagation with `anyhow`.
///
/// This type is used for operational errors that need rich context
/// but don't require specific handling logic.
pub type Result<T> = StdResult<T, Error>;

#[cfg(test)]
mod tests {
    use std::{
        io::{Error, ErrorKind::ResourceBusy},
        path::PathBuf,
    };

    use crate::{
        error::domain::{ChecksumError, ReconcileError, WatchError},
        reconcile::{Action, EventKind, Identity, Move, RawEvent},
    };

    #[test]
    fn test_reconcile_error_display() {
        let error = ReconcileError::UnrecognizedEvent {
            kind: "rename".to_string(),
        };
        assert_eq!(error.to_string(), "Unrecognized event kind: rename");

        let action = Action::MoveFile(Move {
            path: PathBuf::from("/new/f"),
            ino: Some(7),
            stats: None,
            checksum: Some("sum".to_string()),
            old: Identity::new("/old/f", Some(7)),
            wip: false,
            need_refetch: false,
        });
        let error = ReconcileError::DoubleObservation {
            ino: 7,
            event: Box::new(RawEvent::new(EventKind::Unlink, "/other").with_ino(7)),
            action: Box::new(action),
        };
        let message = error.to_string();
        assert!(message.starts_with("Double observation of inode 7: unlink event"));
        assert!(message.contains("MoveFile"));
    }

    #[test]
    fn test_checksum_error_display() {
        let error = ChecksumError::Io {
            path: PathBuf::from("/locked"),
            source: Error::from(ResourceBusy),
        };
        assert!(error.to_string().starts_with("Failed to compute checksum"));

        let error = ChecksumError::Abandoned {
            path: PathBuf::from("/f"),
        };
        assert_eq!(error.to_string(), "Checksum request for \"/f\" was abandoned");
    }

    #[test]
    fn test_watch_error_display() {
        let error = WatchError::NotWatched {
            path: PathBuf::from("/music"),
        };
        assert_eq!(error.to_string(), "Directory is not watched: \"/music\"");
    }
}
