use crate::gateway::GatewayError;
use crate::store::StoreError;
use crate::sync::status::{DataSyncStatus, ServerStatus, SyncStage};

/// Errors that end a synchronization run
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
	#[error("Gateway error: {0}")]
	Gateway(#[from] GatewayError),

	#[error("Store error: {0}")]
	Store(#[from] StoreError),

	#[error("Server is not configured")]
	NotConfigured,

	#[error("Synchronization cancelled")]
	Cancelled,
}

/// A fatal error together with the stage it interrupted.
#[derive(Debug, thiserror::Error)]
#[error("{stage}: {source}")]
pub struct StageFailure {
	pub stage: SyncStage,
	#[source]
	pub source: SyncError,
}

impl StageFailure {
	pub fn new(stage: SyncStage, source: impl Into<SyncError>) -> Self {
		Self {
			stage,
			source: source.into(),
		}
	}

	/// The FAILED event reported for this failure.
	pub fn status(&self) -> DataSyncStatus {
		classify(self.stage, &self.source)
	}
}

/// Attach the current stage to a fallible step.
pub trait AtStage<T> {
	fn at(self, stage: SyncStage) -> Result<T, StageFailure>;
}

impl<T, E: Into<SyncError>> AtStage<T> for Result<T, E> {
	fn at(self, stage: SyncStage) -> Result<T, StageFailure> {
		self.map_err(|e| StageFailure::new(stage, e))
	}
}

pub const NOT_CONNECTED: &str = "not connected";
pub const SERVER_ERROR: &str = "server error";
pub const NOT_CONFIGURED: &str = "server is not configured";
pub const CANCELLED: &str = "synchronization cancelled";

/// Map a fatal error raised by `stage` to the FAILED event reported to the caller.
///
/// This is the only place failure semantics are decided; stages just propagate errors.
pub fn classify(stage: SyncStage, error: &SyncError) -> DataSyncStatus {
	match error {
		SyncError::Gateway(GatewayError::Unauthorized) => {
			DataSyncStatus::failed(stage, NOT_CONNECTED, Some(ServerStatus::Unauthorized))
		}
		SyncError::Gateway(GatewayError::Server(_)) => DataSyncStatus::failed(
			stage,
			SERVER_ERROR,
			Some(ServerStatus::InternalServerError),
		),
		SyncError::NotConfigured | SyncError::Gateway(GatewayError::Configuration(_)) => {
			DataSyncStatus::failed(
				stage,
				NOT_CONFIGURED,
				Some(ServerStatus::InternalServerError),
			)
		}
		SyncError::Cancelled => DataSyncStatus::failed(stage, CANCELLED, None),
		_ => DataSyncStatus::failed(stage, stage.failure_message(), None),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::Category;
	use crate::sync::status::SyncState;

	#[test]
	fn unauthorized_is_classified() {
		let status = classify(
			SyncStage::Observers,
			&SyncError::Gateway(GatewayError::Unauthorized),
		);
		assert_eq!(status.state, SyncState::Failed);
		assert_eq!(status.server_status, Some(ServerStatus::Unauthorized));
		assert_eq!(status.message.as_deref(), Some(NOT_CONNECTED));
	}

	#[test]
	fn server_errors_are_classified() {
		let status = classify(
			SyncStage::Datasets,
			&SyncError::Gateway(GatewayError::Server(503)),
		);
		assert_eq!(status.server_status, Some(ServerStatus::InternalServerError));
		assert_eq!(status.message.as_deref(), Some(SERVER_ERROR));
	}

	#[test]
	fn other_errors_get_a_stage_message() {
		let status = classify(
			SyncStage::TaxonomyRanks,
			&SyncError::Gateway(GatewayError::Network("timed out".to_string())),
		);
		assert_eq!(status.server_status, None);
		assert_eq!(
			status.message.as_deref(),
			Some("failed to synchronize taxonomy ranks")
		);

		let status = classify(
			SyncStage::Nomenclatures,
			&SyncError::Store(StoreError::WriteFailed {
				category: Category::Nomenclatures,
				reason: "disk full".to_string(),
			}),
		);
		assert_eq!(status.server_status, None);
		assert_eq!(
			status.message.as_deref(),
			Some("failed to synchronize nomenclatures")
		);
	}

	#[test]
	fn failures_remember_their_stage() {
		let result: Result<(), GatewayError> = Err(GatewayError::Server(500));
		let failure = result.at(SyncStage::DefaultNomenclatures).unwrap_err();
		assert_eq!(failure.stage, SyncStage::DefaultNomenclatures);
		assert_eq!(failure.status().stage, SyncStage::DefaultNomenclatures);
		assert_eq!(
			failure.status().server_status,
			Some(ServerStatus::InternalServerError)
		);
	}

	#[test]
	fn missing_configuration() {
		let status = classify(SyncStage::Connectivity, &SyncError::NotConfigured);
		assert_eq!(status.server_status, Some(ServerStatus::InternalServerError));
		assert_eq!(status.message.as_deref(), Some(NOT_CONFIGURED));
	}
}
