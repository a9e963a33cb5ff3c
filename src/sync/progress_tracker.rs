//! Progress tracking for reference data synchronization.
//!
//! This module provides the `SyncProgressTracker`, which follows the status events of one run. It
//! records how many rows each stage synchronized, which stage is in flight and where the run
//! failed, and provides statistics and a summary that the orchestrator logs when the run ends.

use crate::sync::status::{DataSyncStatus, SyncStage, SyncState};

use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Service for tracking synchronization progress
///
/// The tracker is fed every event the run emits, in order. Counts of SUCCEEDED events are kept
/// per stage; a stage reporting twice keeps its latest count.
#[derive(Debug, Clone)]
pub struct SyncProgressTracker {
    /// When the run started
    started_at: Instant,
    /// Rows synchronized per stage, in completion order
    synchronized: Vec<(SyncStage, usize)>,
    /// Stage of the latest RUNNING event
    current_stage: Option<SyncStage>,
    /// Stage of the FAILED event, if any
    failed_stage: Option<SyncStage>,
    /// Total events seen
    events: usize,
}

impl Default for SyncProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncProgressTracker {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            synchronized: Vec::new(),
            current_stage: None,
            failed_stage: None,
            events: 0,
        }
    }

    /// Record an emitted event
    pub fn record(&mut self, status: &DataSyncStatus) {
        self.events += 1;

        match status.state {
            SyncState::Running => self.current_stage = Some(status.stage),
            SyncState::Succeeded => {
                let count = status.count.unwrap_or_default();
                match self
                    .synchronized
                    .iter_mut()
                    .find(|(stage, _)| *stage == status.stage)
                {
                    Some((_, existing)) => *existing = count,
                    None => self.synchronized.push((status.stage, count)),
                }
            }
            SyncState::Failed => self.failed_stage = Some(status.stage),
        }
    }

    /// The stage currently in flight
    pub fn current_stage(&self) -> Option<SyncStage> {
        self.current_stage
    }

    /// Rows synchronized by `stage` in this run, if it completed
    pub fn count(&self, stage: SyncStage) -> Option<usize> {
        self.synchronized
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, count)| *count)
    }

    /// Get sync statistics as a SyncStats struct
    pub fn get_stats(&self) -> SyncStats {
        SyncStats {
            stages: self.synchronized.clone(),
            total_rows: self.synchronized.iter().map(|(_, count)| count).sum(),
            events: self.events,
            failed_stage: self.failed_stage,
            elapsed: self.started_at.elapsed(),
        }
    }

    /// Log the end-of-run summary
    pub fn log_summary(&self) {
        let stats = self.get_stats();
        match stats.failed_stage {
            Some(stage) => warn!("{} (failed at {})", stats.summary(), stage),
            None => info!("{}", stats.summary()),
        }
    }
}

/// Statistics about one synchronization run
#[derive(Debug, Clone)]
pub struct SyncStats {
    pub stages: Vec<(SyncStage, usize)>,
    pub total_rows: usize,
    pub events: usize,
    pub failed_stage: Option<SyncStage>,
    pub elapsed: Duration,
}

impl SyncStats {
    /// Get a human-readable summary of the sync statistics
    pub fn summary(&self) -> String {
        let per_stage = self
            .stages
            .iter()
            .map(|(stage, count)| format!("{} {}", stage, count))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "Synchronized {} rows over {} stages in {:.2}s{}",
            self.total_rows,
            self.stages.len(),
            self.elapsed.as_secs_f64(),
            if per_stage.is_empty() {
                String::new()
            } else {
                format!(": {}", per_stage)
            }
        )
    }
}
