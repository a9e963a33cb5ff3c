//! Reference Data Synchronization Module
//!
//! This module provides the pipeline that brings the local reference data (datasets, observers,
//! taxonomy, nomenclatures, taxa and additional fields) in line with the remote service.
//! It is composed of several submodules, each responsible for a specific aspect of the run:
//!
//! - `orchestrator`: The main entry point. It opens the store transaction, sequences the stages and commits or rolls back.
//! - `stages`: The stage trait, the runner deciding whether a run continues, and the simple fetch/replace stages.
//! - `nomenclature`: Flattens the nomenclature tree and writes it in dependency order.
//! - `taxa`: Pluggable taxa synchronization with a paged default implementation.
//! - `additional_fields`: Pluggable synchronization of module-specific additional fields.
//! - `decode`: Schema-validated decoding of loosely-typed payloads.
//! - `errors`: Pipeline errors and the failure classification table.
//! - `events`: Ordered, back-pressured delivery of status events.
//! - `progress_tracker`: Per-run counters and summary.
//! - `status`: The status events themselves.
//!
//! A run either commits every category it touched or leaves the store exactly as it was.

/// Module-specific additional fields
pub mod additional_fields;
/// Payload decoders
pub mod decode;
/// Pipeline errors and failure classification
pub mod errors;
/// Status event delivery
pub mod events;
/// Nomenclature reconciliation
pub mod nomenclature;
/// Main coordinator for a synchronization run
pub mod orchestrator;
/// Tracks synchronization progress and statistics
pub mod progress_tracker;
/// Stage trait, runner and simple stages
pub mod stages;
/// Status events
pub mod status;
/// Taxa synchronization
pub mod taxa;

pub use errors::{SyncError, classify};
pub use orchestrator::*;
pub use status::{DataSyncStatus, ServerStatus, SyncStage, SyncState};
