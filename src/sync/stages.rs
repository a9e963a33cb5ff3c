//! Reconciliation stages and the runner that executes them.
//!
//! A stage pulls one kind of reference data from the gateway, decodes it and, when the result is
//! not empty, replaces the matching categories of the open store transaction. Stages report
//! SUCCEEDED events themselves and hand fatal errors back as a [`StageFailure`]; the
//! [`StageRunner`] turns those into the single FAILED event of the run and an
//! [`StageOutcome::Abort`] the orchestrator acts on.

use crate::gateway::{RemoteDataGateway, UserRecord};
use crate::model::Observer;
use crate::store::{Category, Rows, StoreTransaction};
use crate::sync::decode::{Decoded, decode_datasets, decode_taxonomy_ranks, tolerate_malformed};
use crate::sync::errors::{AtStage, StageFailure, SyncError};
use crate::sync::events::StatusEmitter;
use crate::sync::orchestrator::{Params, SyncConfig};
use crate::sync::status::{DataSyncStatus, SyncStage};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Everything a stage works with during one run.
pub struct StageContext<'a> {
	pub gateway: &'a dyn RemoteDataGateway,
	pub tx: &'a mut dyn StoreTransaction,
	pub emitter: &'a mut StatusEmitter,
	pub params: &'a Params,
	pub config: &'a SyncConfig,
	pub cancel: &'a CancellationToken,
}

impl StageContext<'_> {
	pub async fn emit(&mut self, status: DataSyncStatus) {
		self.emitter.emit(status).await;
	}

	/// Fail with [`SyncError::Cancelled`] once the run has been cancelled.
	pub fn check_cancelled(&self, stage: SyncStage) -> Result<(), StageFailure> {
		if self.cancel.is_cancelled() {
			return Err(StageFailure::new(stage, SyncError::Cancelled));
		}
		Ok(())
	}

	/// Replace the category of `rows` and report `stage` as succeeded.
	///
	/// An empty batch is reported as SUCCEEDED(0) and leaves the category untouched.
	pub async fn replace_or_skip(&mut self, stage: SyncStage, rows: Rows) -> Result<(), StageFailure> {
		let count = rows.len();
		if count > 0 {
			self.tx.replace_all(rows).await.at(stage)?;
		} else {
			debug!("Nothing to update for {}", stage);
		}
		self.emit(DataSyncStatus::succeeded(stage, count)).await;
		Ok(())
	}
}

/// Whether the orchestrator should go on with the next stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
	Continue,
	Abort,
}

/// One step of the pipeline
#[async_trait::async_trait]
pub trait Stage: Send + Sync {
	/// The stage the opening RUNNING event is reported under
	fn stage(&self) -> SyncStage;

	/// Fetch, decode, persist and report
	async fn run(&self, ctx: &mut StageContext<'_>) -> Result<(), StageFailure>;
}

/// Executes stages and decides whether the run may continue.
pub struct StageRunner;

impl StageRunner {
	pub async fn run(stage: &dyn Stage, ctx: &mut StageContext<'_>) -> StageOutcome {
		let result = match ctx.check_cancelled(stage.stage()) {
			Ok(()) => {
				ctx.emit(DataSyncStatus::running(stage.stage(), None)).await;
				stage.run(ctx).await
			}
			Err(cancelled) => Err(cancelled),
		};

		match result {
			Ok(()) => StageOutcome::Continue,
			Err(failure) => {
				warn!("Stage {} aborted the run: {}", failure.stage, failure.source);
				ctx.emit(failure.status()).await;
				StageOutcome::Abort
			}
		}
	}
}

/// Verify that the gateway has base URLs and reports itself ready.
pub async fn check_reachable(gateway: &dyn RemoteDataGateway) -> Result<(), SyncError> {
	let urls = gateway.base_urls()?;
	debug!("Using GeoNature at {} and TaxHub at {}", urls.geonature, urls.taxhub);

	if !gateway.check_settings().await {
		return Err(SyncError::NotConfigured);
	}
	Ok(())
}

/// Datasets of the configured module
pub struct DatasetStage;

#[async_trait::async_trait]
impl Stage for DatasetStage {
	fn stage(&self) -> SyncStage {
		SyncStage::Datasets
	}

	async fn run(&self, ctx: &mut StageContext<'_>) -> Result<(), StageFailure> {
		let config = ctx.config;
		let module_code = config.module_code.as_str();
		let payload = tolerate_malformed(ctx.gateway.get_meta_datasets(module_code).await)
			.at(SyncStage::Datasets)?;
		let datasets = payload
			.and_then(|payload| decode_datasets(&payload, module_code))
			.rows_or_warn(SyncStage::Datasets);

		let count = datasets.len();
		if count > 0 {
			ctx.tx
				.delete_module(Category::Datasets, module_code)
				.await
				.at(SyncStage::Datasets)?;
			ctx.tx
				.insert(Rows::Datasets(datasets))
				.await
				.at(SyncStage::Datasets)?;
		}
		ctx.emit(DataSyncStatus::succeeded(SyncStage::Datasets, count))
			.await;
		Ok(())
	}
}

/// Observers of the configured users menu
pub struct ObserverStage;

fn observer(record: UserRecord) -> Observer {
	Observer {
		id: record.id,
		last_name: record.last_name,
		first_name: record.first_name,
	}
}

#[async_trait::async_trait]
impl Stage for ObserverStage {
	fn stage(&self) -> SyncStage {
		SyncStage::Observers
	}

	async fn run(&self, ctx: &mut StageContext<'_>) -> Result<(), StageFailure> {
		let users: Decoded<Vec<UserRecord>> =
			tolerate_malformed(ctx.gateway.get_users(ctx.params.users_menu_id).await)
				.at(SyncStage::Observers)?;
		let observers = users
			.map(|users| users.into_iter().map(observer).collect())
			.rows_or_warn(SyncStage::Observers);

		ctx.replace_or_skip(SyncStage::Observers, Rows::Observers(observers))
			.await
	}
}

/// Kingdoms and groups known to the taxonomy service
///
/// Ranks still referenced by nomenclature links are kept when the ranks are replaced, so wildcard
/// rows added by nomenclature scopes survive even when the nomenclature stage writes nothing.
pub struct TaxonomyStage;

#[async_trait::async_trait]
impl Stage for TaxonomyStage {
	fn stage(&self) -> SyncStage {
		SyncStage::TaxonomyRanks
	}

	async fn run(&self, ctx: &mut StageContext<'_>) -> Result<(), StageFailure> {
		let payload = tolerate_malformed(ctx.gateway.get_taxonomy_ranks().await)
			.at(SyncStage::TaxonomyRanks)?;
		let ranks = payload
			.and_then(|payload| decode_taxonomy_ranks(&payload))
			.rows_or_warn(SyncStage::TaxonomyRanks);

		let count = ranks.len();
		if count > 0 {
			ctx.tx
				.delete_unlinked_taxonomy()
				.await
				.at(SyncStage::TaxonomyRanks)?;
			ctx.tx
				.insert(Rows::Taxonomy(ranks))
				.await
				.at(SyncStage::TaxonomyRanks)?;
		}
		ctx.emit(DataSyncStatus::succeeded(SyncStage::TaxonomyRanks, count))
			.await;
		Ok(())
	}
}
