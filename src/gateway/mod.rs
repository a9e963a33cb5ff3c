//! Remote reference data gateway
//!
//! This module provides the gateway trait the synchronization pipeline pulls reference data
//! through, the wire records it returns, and two implementations: an HTTP client for the
//! GeoNature/TaxHub APIs and a scripted mock.

/// HTTP client for the GeoNature and TaxHub APIs
mod client;
/// Scripted gateway for tests and offline runs
mod mock;
/// Wire records, errors and the gateway trait
mod types;

pub use client::{GatewayConfig, HttpGateway};
pub use mock::MockGateway;
pub use types::*;
