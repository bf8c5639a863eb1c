//! Groups annotated events into reconciliation batches.

use std::{mem::take, time::Duration};

use {
    async_channel::{Receiver, Sender},
    tokio::time::timeout,
    tracing::{debug, trace},
};

use crate::{local::watcher::config::WatcherConfig, reconcile::RawEvent};

/// Collects events until the watcher has been quiet for the debounce delay,
/// then forwards everything collected as one batch.
///
/// A continuous stream of events keeps the batch open, so an operation
/// touching many files ends up in a single batch.
pub struct EventBatcher {
    /// Receiver for annotated events.
    event_receiver: Receiver<RawEvent>,
    /// Sender for complete batches.
    batch_sender: Sender<Vec<RawEvent>>,
    /// Quiet period closing a batch.
    quiet_period: Duration,
}

impl EventBatcher {
    /// Creates a new event batcher.
    ///
    /// # Arguments
    ///
    /// * `event_receiver` - Receiver for annotated events.
    /// * `batch_sender` - Sender for complete batches.
    /// * `config` - Watcher configuration providing the debounce delay.
    ///
    /// # Returns
    ///
    /// A new `EventBatcher`.
    pub fn new(
        event_receiver: Receiver<RawEvent>,
        batch_sender: Sender<Vec<RawEvent>>,
        config: &WatcherConfig,
    ) -> Self {
        Self {
            event_receiver,
            batch_sender,
            quiet_period: Duration::from_millis(config.debounce_delay_ms),
        }
    }

    /// Runs the batching loop until the event channel closes.
    ///
    /// The batch collected so far is flushed when the channel closes.
    pub async fn start_processing(self) {
        let mut batch = Vec::new();

        loop {
            let next = if batch.is_empty() {
                self.event_receiver.recv().await.ok()
            } else {
                match timeout(self.quiet_period, self.event_receiver.recv()).await {
                    Ok(received) => received.ok(),
                    Err(_) => {
                        if !self.flush(&mut batch).await {
                            break;
                        }
                        continue;
                    }
                }
            };

            match next {
                Some(event) => {
                    trace!("Batching {} event on {:?}", event.kind, event.path);
                    batch.push(event);
                }
                None => {
                    self.flush(&mut batch).await;
                    break;
                }
            }
        }
        debug!("Event batcher stopped");
    }

    /// Sends the collected events, returns `false` once nobody listens.
    async fn flush(&self, batch: &mut Vec<RawEvent>) -> bool {
        if batch.is_empty() {
            return true;
        }

        debug!("Flushing batch of {} event(s)", batch.len());
        self.batch_sender.send(take(batch)).await.is_ok()
    }
}
