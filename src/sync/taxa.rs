//! Taxa synchronization.
//!
//! Taxa lists are large, so they are pulled page by page. The orchestrator delegates this stage to
//! a [`TaxaSync`] implementation; [`PagedTaxaSync`] is the default one.

use crate::gateway::{GatewayError, TaxonAreaRecord, TaxonRecord};
use crate::model::{ANY, Taxon, TaxonArea, Taxonomy};
use crate::store::Rows;
use crate::sync::decode::{Decoded, parse_timestamp, tolerate_malformed};
use crate::sync::errors::{AtStage, StageFailure};
use crate::sync::stages::{Stage, StageContext};
use crate::sync::status::{DataSyncStatus, SyncStage};

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// What the taxa stage is asked to synchronize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxaRequest {
	pub list_id: i64,
	pub with_additional_data: bool,
	pub code_area_type: Option<String>,
	pub page_size: usize,
}

/// Collaborator reconciling taxa (and, optionally, their area statistics).
#[async_trait::async_trait]
pub trait TaxaSync: Send + Sync {
	async fn sync_taxa(
		&self,
		ctx: &mut StageContext<'_>,
		request: &TaxaRequest,
	) -> Result<(), StageFailure>;

	/// Get the name of this implementation
	fn name(&self) -> &'static str;
}

/// Pulls complete taxa lists with limit/offset paging.
///
/// Every page is accumulated before anything is written, so a malformed page turns the whole
/// category into a no-op instead of a partial list. Paging stops at the first short page, or at a
/// page repeating the previous one when the server does not honor the offset.
#[derive(Debug, Clone, Default)]
pub struct PagedTaxaSync;

impl PagedTaxaSync {
	pub fn new() -> Self {
		Self
	}
}

async fn fetch_pages<T, F, Fut>(
	ctx: &mut StageContext<'_>,
	stage: SyncStage,
	page_size: usize,
	fetch: F,
) -> Result<Decoded<Vec<T>>, StageFailure>
where
	T: PartialEq + Send,
	F: Fn(usize) -> Fut + Send,
	Fut: Future<Output = Result<Vec<T>, GatewayError>> + Send,
{
	let mut rows = Vec::new();

	loop {
		ctx.check_cancelled(stage)?;

		let page = match tolerate_malformed(fetch(rows.len()).await).at(stage)? {
			Decoded::Ok(page) => page,
			Decoded::Malformed(reason) => return Ok(Decoded::Malformed(reason)),
		};
		let fetched = page.len();
		if fetched > 0 && rows.len() >= fetched && rows[rows.len() - fetched..] == page[..] {
			warn!(
				"Stopping {} paging at offset {}: the server returned the previous page again",
				stage,
				rows.len()
			);
			return Ok(Decoded::Ok(rows));
		}
		rows.extend(page);
		debug!("Fetched {} {} (offset {})", fetched, stage, rows.len() - fetched);

		ctx.emit(DataSyncStatus::running(stage, Some(rows.len())))
			.await;
		if fetched < page_size {
			return Ok(Decoded::Ok(rows));
		}
	}
}

fn rank(value: Option<String>) -> String {
	value
		.filter(|v| !v.trim().is_empty())
		.unwrap_or_else(|| ANY.to_string())
}

fn taxon(record: TaxonRecord) -> Taxon {
	Taxon {
		id: record.id,
		name: record.name,
		common_name: record.common_name,
		taxonomy: Taxonomy::new(rank(record.kingdom), rank(record.group)),
	}
}

fn taxon_area(record: TaxonAreaRecord) -> TaxonArea {
	TaxonArea {
		taxon_id: record.taxon_id,
		area_id: record.area_id,
		color: record.color,
		number_of_observers: record.number_of_observers.unwrap_or_default(),
		last_updated_at: record.last_date.as_deref().and_then(parse_timestamp),
	}
}

#[async_trait::async_trait]
impl TaxaSync for PagedTaxaSync {
	async fn sync_taxa(
		&self,
		ctx: &mut StageContext<'_>,
		request: &TaxaRequest,
	) -> Result<(), StageFailure> {
		let gateway = ctx.gateway;
		let page_size = request.page_size;

		let taxa = fetch_pages(ctx, SyncStage::Taxa, page_size, move |offset| {
			gateway.get_taxa(request.list_id, page_size, offset)
		})
		.await?
		.map(|records| records.into_iter().map(taxon).collect())
		.rows_or_warn(SyncStage::Taxa);
		ctx.replace_or_skip(SyncStage::Taxa, Rows::Taxa(taxa)).await?;

		if !request.with_additional_data {
			return Ok(());
		}

		ctx.check_cancelled(SyncStage::TaxaAreas)?;
		ctx.emit(DataSyncStatus::running(SyncStage::TaxaAreas, None))
			.await;
		let code_area_type = request.code_area_type.as_deref();
		let areas = fetch_pages(ctx, SyncStage::TaxaAreas, page_size, move |offset| {
			gateway.get_taxa_areas(code_area_type, page_size, offset)
		})
		.await?
		.map(|records| records.into_iter().map(taxon_area).collect())
		.rows_or_warn(SyncStage::TaxaAreas);
		ctx.replace_or_skip(SyncStage::TaxaAreas, Rows::TaxaAreas(areas))
			.await
	}

	fn name(&self) -> &'static str {
		"paged"
	}
}

/// Runs the configured [`TaxaSync`] as a pipeline stage.
pub struct TaxaStage {
	sync: Arc<dyn TaxaSync>,
}

impl TaxaStage {
	pub fn new(sync: Arc<dyn TaxaSync>) -> Self {
		Self { sync }
	}
}

#[async_trait::async_trait]
impl Stage for TaxaStage {
	fn stage(&self) -> SyncStage {
		SyncStage::Taxa
	}

	async fn run(&self, ctx: &mut StageContext<'_>) -> Result<(), StageFailure> {
		let request = TaxaRequest {
			list_id: ctx.config.taxa_list_id,
			with_additional_data: ctx.params.with_additional_data,
			code_area_type: ctx.params.code_area_type.clone(),
			page_size: ctx.params.effective_page_size(),
		};
		debug!("Synchronizing taxa with the {} implementation", self.sync.name());

		self.sync.sync_taxa(ctx, &request).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::gateway::MockGateway;
	use crate::store::MemoryStore;
	use crate::sync::orchestrator::Params;
	use crate::sync::stages::StageOutcome;
	use crate::sync::stages::tests::run_stage;
	use crate::sync::status::SyncState;

	fn taxa(count: i64) -> Vec<TaxonRecord> {
		(1..=count)
			.map(|id| TaxonRecord {
				id,
				name: format!("Taxon {}", id),
				common_name: None,
				kingdom: Some("Animalia".to_string()),
				group: None,
			})
			.collect()
	}

	fn stage() -> TaxaStage {
		TaxaStage::new(Arc::new(PagedTaxaSync::new()))
	}

	#[tokio::test]
	async fn pages_until_a_short_page() {
		let store = MemoryStore::new();
		let gateway = MockGateway::new().with_taxa(taxa(5));
		let params = Params::new(1)
			.with_additional_data(false)
			.with_page_size(2);

		let (outcome, events) = run_stage(&stage(), &gateway, &store, &params).await;

		assert_eq!(outcome, StageOutcome::Continue);
		assert_eq!(gateway.calls(), vec!["get_taxa"; 3]);
		let progress: Vec<_> = events
			.iter()
			.filter(|e| e.state == SyncState::Running)
			.map(|e| e.count)
			.collect();
		assert_eq!(progress, vec![None, Some(2), Some(4), Some(5)]);
		assert_eq!(events.last(), Some(&DataSyncStatus::succeeded(SyncStage::Taxa, 5)));

		let stored = store.snapshot().await.taxa;
		assert_eq!(stored.len(), 5);
		assert_eq!(stored[0].taxonomy, Taxonomy::new("Animalia", ANY));
	}

	#[tokio::test]
	async fn exact_multiple_needs_an_empty_page() {
		let gateway = MockGateway::new().with_taxa(taxa(4));
		let params = Params::new(1)
			.with_additional_data(false)
			.with_page_size(2);

		run_stage(&stage(), &gateway, &MemoryStore::new(), &params).await;

		assert_eq!(gateway.calls().len(), 3);
	}

	#[tokio::test]
	async fn repeated_page_stops_paging() {
		let store = MemoryStore::new();
		let gateway = MockGateway::new().with_taxa(taxa(5)).ignoring_offset();
		let params = Params::new(1)
			.with_additional_data(false)
			.with_page_size(2);

		let (outcome, events) = run_stage(&stage(), &gateway, &store, &params).await;

		assert_eq!(outcome, StageOutcome::Continue);
		assert_eq!(gateway.calls(), vec!["get_taxa"; 2]);
		assert_eq!(events.last(), Some(&DataSyncStatus::succeeded(SyncStage::Taxa, 2)));
		assert_eq!(store.snapshot().await.taxa.len(), 2);
	}

	#[tokio::test]
	async fn areas_follow_taxa_with_additional_data() {
		let store = MemoryStore::new();
		let gateway = MockGateway::new()
			.with_taxa(taxa(1))
			.with_taxa_areas(vec![TaxonAreaRecord {
				taxon_id: 1,
				area_id: 7,
				color: Some("#ff0000".to_string()),
				number_of_observers: None,
				last_date: Some("2020-05-01 08:00:00".to_string()),
			}]);
		let params = Params::new(1).with_code_area_type("M10");

		let (outcome, events) = run_stage(&stage(), &gateway, &store, &params).await;

		assert_eq!(outcome, StageOutcome::Continue);
		assert_eq!(gateway.calls(), vec!["get_taxa", "get_taxa_areas"]);
		assert_eq!(
			events.last(),
			Some(&DataSyncStatus::succeeded(SyncStage::TaxaAreas, 1))
		);
		let areas = store.snapshot().await.taxa_areas;
		assert_eq!(areas[0].number_of_observers, 0);
		assert!(areas[0].last_updated_at.is_some());
	}

	#[tokio::test]
	async fn malformed_page_is_a_no_op() {
		let store = MemoryStore::new();
		let gateway = MockGateway::new()
			.with_taxa(taxa(3))
			.fail("get_taxa", GatewayError::Decode("truncated".to_string()));
		let params = Params::new(1).with_additional_data(false);

		let (outcome, events) = run_stage(&stage(), &gateway, &store, &params).await;

		assert_eq!(outcome, StageOutcome::Continue);
		assert_eq!(events.last(), Some(&DataSyncStatus::succeeded(SyncStage::Taxa, 0)));
		assert!(store.snapshot().await.taxa.is_empty());
	}
}
