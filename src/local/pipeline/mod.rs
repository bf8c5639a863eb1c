//! Local change pipeline coordinator.
//!
//! This module wires the watcher, the annotator, the batcher and the
//! reconciliation cycles together. Its output is a stream of ordered action
//! batches ready to be applied remotely.

use std::{path::Path, sync::Arc};

use {
    anyhow::Error,
    async_channel::{Receiver, Sender, bounded, unbounded},
    parking_lot::RwLock,
    tokio::{spawn, task::JoinHandle},
    tracing::{debug, info, warn},
};

use crate::{
    checksum::ChecksumQueue,
    config::UserSettings,
    error::{ErrorReporter, domain::WatchError},
    local::watcher::{EventAnnotator, EventBatcher, InodeIndex, LocalWatcher, PathFilter},
    reconcile::{Action, RawEvent, Reconciler},
};

mod config;

pub use config::PipelineConfig;

/// Local change pipeline coordinator.
///
/// The `LocalChangePipeline` owns the background tasks turning filesystem
/// notifications into ordered actions, and the pending set carried from one
/// reconciliation cycle to the next.
pub struct LocalChangePipeline {
    /// Filesystem watcher.
    watcher: LocalWatcher,
    /// Inode index shared with the annotator.
    index: InodeIndex,
    /// Checksum queue shared with the annotator.
    checksums: Arc<ChecksumQueue>,
    /// Configuration.
    config: PipelineConfig,
    /// Task handles for background operations.
    tasks: Vec<JoinHandle<()>>,
}

impl LocalChangePipeline {
    /// Creates a new pipeline and starts watching the configured directories.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `settings` - User settings.
    /// * `action_sender` - Channel receiving each cycle's ordered actions.
    /// * `config` - Optional configuration (derived from `settings` if None).
    ///
    /// # Returns
    ///
    /// A `Result` containing the `LocalChangePipeline` or a `WatchError`.
    ///
    /// # Errors
    ///
    /// Returns `WatchError` if an ignore pattern is invalid or the watcher
    /// cannot be initialized. Directories that cannot be watched are only
    /// logged.
    pub fn new(
        settings: Arc<RwLock<UserSettings>>,
        action_sender: Sender<Vec<Action>>,
        config: Option<PipelineConfig>,
    ) -> Result<Self, WatchError> {
        let config = config.unwrap_or_else(|| PipelineConfig::from_settings(&settings.read()));

        let (change_sender, change_receiver) = bounded(config.change_capacity);
        let (event_sender, event_receiver) = unbounded();
        let (batch_sender, batch_receiver) = unbounded();

        let filter = PathFilter::new(&config.watcher_config)?;
        let watcher = LocalWatcher::new(change_sender, Some(config.watcher_config.clone()))?;
        let index = InodeIndex::new();
        let checksums = Arc::new(ChecksumQueue::new(config.checksum_config.clone()));

        let annotator = EventAnnotator::new(
            index.clone(),
            filter,
            checksums.clone(),
            watcher.watched_paths().clone(),
        );
        let batcher = EventBatcher::new(event_receiver, batch_sender, &config.watcher_config);

        let tasks = vec![
            spawn(annotator.start_processing(change_receiver, event_sender)),
            spawn(batcher.start_processing()),
            spawn(Self::run_cycles(batch_receiver, action_sender)),
        ];

        let mut pipeline = Self {
            watcher,
            index,
            checksums,
            config,
            tasks,
        };

        let watch_dirs = settings.read().watch_directories.clone();
        for dir in &watch_dirs {
            if let Err(e) = pipeline.add_directory(dir) {
                warn!("Failed to watch directory {:?}: {}", dir, e);
            }
        }

        Ok(pipeline)
    }

    /// Runs one reconciliation cycle per batch.
    ///
    /// A batch failing with a fatal error is dropped as a whole. The pending
    /// set from before it is kept.
    async fn run_cycles(receiver: Receiver<Vec<RawEvent>>, sender: Sender<Vec<Action>>) {
        let mut reconciler = Reconciler::new();

        while let Ok(batch) = receiver.recv().await {
            let event_count = batch.len();
            match reconciler.process(batch) {
                Ok(actions) if actions.is_empty() => {
                    debug!(
                        pending = reconciler.pending().len(),
                        "Batch of {} event(s) produced no action", event_count
                    );
                }
                Ok(actions) => {
                    info!(
                        pending = reconciler.pending().len(),
                        "Prepared {} action(s) from {} event(s)",
                        actions.len(),
                        event_count
                    );
                    if sender.send(actions).await.is_err() {
                        debug!("Action channel closed, stopping cycles");
                        break;
                    }
                }
                Err(e) => {
                    ErrorReporter::error(
                        &Error::from(e),
                        &format!("Dropping batch of {event_count} event(s)"),
                    );
                }
            }
        }
    }

    /// Adds a directory to be watched.
    ///
    /// The directory is watched before its content is indexed, so nothing
    /// created in between goes unnoticed.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory path to add.
    ///
    /// # Errors
    ///
    /// Returns `WatchError` if the directory cannot be watched or read.
    pub fn add_directory<P: AsRef<Path>>(&mut self, path: P) -> Result<(), WatchError> {
        let path = path.as_ref();

        self.watcher.watch_directory(path)?;
        if let Err(e) = self.index.scan(path) {
            let _ = self.watcher.unwatch_directory(path);
            return Err(e);
        }

        info!("Watching {:?} ({} entries indexed)", path, self.index.len());
        Ok(())
    }

    /// Removes a directory from monitoring.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory path to remove.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::NotWatched` if the directory was not watched.
    pub fn remove_directory<P: AsRef<Path>>(&mut self, path: P) -> Result<(), WatchError> {
        let path = path.as_ref();

        self.watcher.unwatch_directory(path)?;
        let forgotten = self.index.remove_tree(path).len();

        debug!("Forgot {} indexed entries below {:?}", forgotten, path);
        Ok(())
    }

    /// Gets the current pipeline configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Number of checksum requests waiting.
    pub fn queued_checksums(&self) -> usize {
        self.checksums.queued()
    }

    /// Stops watching and lets the changes already observed drain through.
    ///
    /// Returns once the last batch has been reconciled.
    pub async fn shutdown(self) {
        let Self { watcher, tasks, .. } = self;
        drop(watcher);

        for task in tasks {
            if let Err(e) = task.await {
                warn!("Pipeline task failed: {}", e);
            }
        }
        debug!("Local change pipeline stopped");
    }
}
