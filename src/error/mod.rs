//! Error handling built on `thiserror` and `anyhow`.
//!
//! Domain errors are precise enums callers can match on; operational helpers
//! attach context for logging and for the binary's top-level reporting.

pub mod domain;
pub mod operational;

pub use {
    domain::{ChecksumError, ReconcileError, WatchError},
    operational::{ErrorReporter, ResultExt},
};
