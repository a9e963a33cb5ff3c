//! Delivery of status events to the caller.
//!
//! Every event of a run goes through the `StatusEmitter`: it is logged, fed to the progress
//! tracker and sent on a bounded channel that backs the caller's status stream. Sending suspends
//! while the channel is full, so the pipeline never runs ahead of a slow consumer by more than the
//! channel capacity and events are delivered in exactly the order they were emitted.

use crate::sync::progress_tracker::SyncProgressTracker;
use crate::sync::status::{DataSyncStatus, SyncState};

use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Ordered, back-pressured emitter of status events.
pub struct StatusEmitter {
    sender: mpsc::Sender<DataSyncStatus>,
    tracker: SyncProgressTracker,
    /// Set once the receiving side went away
    detached: bool,
}

impl StatusEmitter {
    pub fn new(sender: mpsc::Sender<DataSyncStatus>) -> Self {
        Self {
            sender,
            tracker: SyncProgressTracker::new(),
            detached: false,
        }
    }

    /// Emit an event.
    ///
    /// A caller that stopped consuming the stream does not stop the run: the event is still
    /// logged and tracked, only its delivery is skipped.
    pub async fn emit(&mut self, status: DataSyncStatus) {
        match status.state {
            SyncState::Running => debug!(
                "{}{}",
                status.message.as_deref().unwrap_or_default(),
                status
                    .count
                    .map(|count| format!(" ({} so far)", count))
                    .unwrap_or_default()
            ),
            SyncState::Succeeded => info!("{}", status.message.as_deref().unwrap_or_default()),
            SyncState::Failed => error!(
                "Synchronization failed at {}: {}",
                status.stage,
                status.message.as_deref().unwrap_or_default()
            ),
        }

        self.tracker.record(&status);

        if self.detached {
            return;
        }
        if self.sender.send(status).await.is_err() {
            debug!("Status stream dropped by the caller, continuing without observer");
            self.detached = true;
        }
    }

    pub fn tracker(&self) -> &SyncProgressTracker {
        &self.tracker
    }
}
