//! File system change detection using the `notify` crate.
//!
//! This module watches the local directories recursively, turns `notify`
//! events into annotated raw events and groups them into batches for the
//! reconciliation cycles.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    async_channel::Sender,
    notify::{Config, Error, Event, RecommendedWatcher, RecursiveMode::Recursive, Watcher},
    parking_lot::RwLock,
    tracing::{debug, error, warn},
};

use crate::error::domain::WatchError;

mod annotator;
mod config;
mod debouncer;
mod events;
mod filter;
mod index;

pub use {
    annotator::EventAnnotator,
    config::WatcherConfig,
    debouncer::EventBatcher,
    events::{FsChange, translate},
    filter::PathFilter,
    index::{IndexedEntry, InodeIndex, walk},
};

/// Recursive watcher over the local directories.
///
/// The `LocalWatcher` forwards every relevant change reported by `notify`
/// as an `FsChange`. Filtering and annotation happen downstream in the
/// `EventAnnotator`.
pub struct LocalWatcher {
    /// Internal notify watcher.
    watcher: RecommendedWatcher,
    /// Set of currently watched paths.
    watched_paths: Arc<RwLock<HashSet<PathBuf>>>,
    /// Configuration for watcher behavior.
    config: WatcherConfig,
}

impl LocalWatcher {
    /// Creates a new local watcher.
    ///
    /// # Arguments
    ///
    /// * `change_sender` - Channel sender for filesystem changes.
    /// * `config` - Optional configuration (uses defaults if None).
    ///
    /// # Returns
    ///
    /// A `Result` containing the `LocalWatcher` or a `WatchError`.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::NotifyError` if the platform watcher cannot be
    /// initialized.
    pub fn new(
        change_sender: Sender<FsChange>,
        config: Option<WatcherConfig>,
    ) -> Result<Self, WatchError> {
        let config = config.unwrap_or_default();

        let watcher = RecommendedWatcher::new(
            move |res: Result<Event, Error>| {
                Self::handle_raw_event(res, &change_sender);
            },
            Config::default(),
        )?;

        Ok(Self {
            watcher,
            watched_paths: Arc::new(RwLock::new(HashSet::new())),
            config,
        })
    }

    /// Handles raw events from the notify crate.
    ///
    /// Runs on the notify thread, so changes are handed over without
    /// blocking.
    fn handle_raw_event(res: Result<Event, Error>, sender: &Sender<FsChange>) {
        match res {
            Ok(event) => {
                debug!("Raw file system event: {:?}", event);

                for change in translate(&event) {
                    if let Err(e) = sender.try_send(change) {
                        warn!("Dropping filesystem change: {}", e);
                    }
                }
            }
            Err(e) => {
                error!("File system watcher error: {}", e);
            }
        }
    }

    /// Adds a directory to be watched recursively.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory path to watch.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::NotifyError` if the directory cannot be watched.
    pub fn watch_directory<P: AsRef<Path>>(&mut self, path: P) -> Result<(), WatchError> {
        let path = path.as_ref();

        self.watcher.watch(path, Recursive)?;
        self.watched_paths.write().insert(path.to_path_buf());

        debug!("Started watching directory: {:?}", path);
        Ok(())
    }

    /// Stops watching a directory.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory path to stop watching.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::NotWatched` if the directory was not watched, or
    /// `WatchError::NotifyError` if `notify` refuses to unwatch it.
    pub fn unwatch_directory<P: AsRef<Path>>(&mut self, path: P) -> Result<(), WatchError> {
        let path = path.as_ref();

        if !self.watched_paths.write().remove(path) {
            return Err(WatchError::NotWatched {
                path: path.to_path_buf(),
            });
        }
        self.watcher.unwatch(path)?;

        debug!("Stopped watching directory: {:?}", path);
        Ok(())
    }

    /// Gets the current configuration.
    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Gets the set of currently watched paths.
    ///
    /// The set is shared: it stays current as directories are added and
    /// removed.
    pub fn watched_paths(&self) -> &Arc<RwLock<HashSet<PathBuf>>> {
        &self.watched_paths
    }
}
