//! Syncprep - local change preparation for a file sync client
//!
//! Watches local directories and turns raw filesystem notifications into a
//! minimal, ordered list of actions (adds, updates, deletes and moves) that
//! can be replayed one by one against a remote copy. Moves are recognized
//! from inode identity, operations still in progress are held back until a
//! later batch completes them, and moves implied by a parent folder move are
//! folded into it.

pub mod checksum;
pub mod config;
pub mod error;
pub mod local;
pub mod reconcile;

// Re-export key types for convenience
pub use {
    checksum::{ChecksumConfig, ChecksumQueue},
    config::{SettingsManager, UserSettings},
    error::{ChecksumError, ReconcileError, WatchError},
    local::{LocalChangePipeline, PipelineConfig},
    reconcile::{
        Action, EventKind, PendingActionSet, RawEvent, Reconciled, Reconciler, sort_and_squash,
    },
};
