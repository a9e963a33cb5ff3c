//! Synchronization of GeoNature reference data into a local store.
//!
//! The [`sync::SyncOrchestrator`] pulls datasets, observers, taxonomy, nomenclatures, taxa and
//! optional additional fields through a [`gateway::RemoteDataGateway`], writes them to a
//! [`store::LocalStore`] inside one transaction, and reports progress as a stream of
//! [`sync::DataSyncStatus`] events.

pub mod gateway;
pub mod model;
pub mod settings;
pub mod store;
pub mod sync;
