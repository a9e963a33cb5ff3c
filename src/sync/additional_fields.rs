//! Module-specific additional fields.
//!
//! Only synchronized when the caller asks for them. The orchestrator delegates the stage to an
//! [`AdditionalFieldsSync`] implementation; [`GatewayAdditionalFieldsSync`] is the default one.

use crate::store::Rows;
use crate::sync::decode::{decode_additional_fields, tolerate_malformed};
use crate::sync::errors::{AtStage, StageFailure};
use crate::sync::stages::{Stage, StageContext};
use crate::sync::status::{DataSyncStatus, SyncStage};

use std::sync::Arc;
use tracing::debug;

/// Collaborator reconciling additional fields of the configured module.
#[async_trait::async_trait]
pub trait AdditionalFieldsSync: Send + Sync {
	async fn sync_additional_fields(&self, ctx: &mut StageContext<'_>) -> Result<(), StageFailure>;
}

/// Fetches the field definitions of the module and replaces fields, their values and their
/// dataset links.
#[derive(Debug, Clone, Default)]
pub struct GatewayAdditionalFieldsSync;

#[async_trait::async_trait]
impl AdditionalFieldsSync for GatewayAdditionalFieldsSync {
	async fn sync_additional_fields(&self, ctx: &mut StageContext<'_>) -> Result<(), StageFailure> {
		let stage = SyncStage::AdditionalFields;
		let config = ctx.config;

		let rows = tolerate_malformed(
			ctx.gateway
				.get_additional_fields(&config.module_code)
				.await,
		)
		.at(stage)?
		.and_then(|payload| decode_additional_fields(&payload, &config.module_code))
		.rows_or_warn(stage);

		let count = rows.fields.len();
		if count == 0 {
			ctx.emit(DataSyncStatus::succeeded(stage, 0)).await;
			return Ok(());
		}

		debug!(
			"Replacing {} additional fields ({} values, {} dataset links)",
			count,
			rows.values.len(),
			rows.datasets.len()
		);
		ctx.tx
			.replace_all(Rows::AdditionalFields(rows.fields))
			.await
			.at(stage)?;
		ctx.tx
			.replace_all(Rows::AdditionalFieldValues(rows.values))
			.await
			.at(stage)?;
		ctx.tx
			.replace_all(Rows::AdditionalFieldDatasets(rows.datasets))
			.await
			.at(stage)?;

		ctx.emit(DataSyncStatus::succeeded(stage, count)).await;
		Ok(())
	}
}

/// Runs the configured [`AdditionalFieldsSync`] as a pipeline stage.
pub struct AdditionalFieldsStage {
	sync: Arc<dyn AdditionalFieldsSync>,
}

impl AdditionalFieldsStage {
	pub fn new(sync: Arc<dyn AdditionalFieldsSync>) -> Self {
		Self { sync }
	}
}

#[async_trait::async_trait]
impl Stage for AdditionalFieldsStage {
	fn stage(&self) -> SyncStage {
		SyncStage::AdditionalFields
	}

	async fn run(&self, ctx: &mut StageContext<'_>) -> Result<(), StageFailure> {
		self.sync.sync_additional_fields(ctx).await
	}
}
