//! Local side of the sync client.
//!
//! The watcher observes the local directories; the pipeline turns what it
//! observes into ordered actions.

pub mod pipeline;
pub mod watcher;

pub use {
    pipeline::{LocalChangePipeline, PipelineConfig},
    watcher::{LocalWatcher, WatcherConfig},
};
