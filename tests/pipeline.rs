use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use refdata_sync::gateway::{
	GatewayError, MockGateway, NomenclatureRecord, NomenclatureTypeTree, TaxonRecord,
	TaxonomyScope, UserRecord,
};
use refdata_sync::model::{ANY, Dataset, NomenclatureTaxonomy, Observer, Taxonomy};
use refdata_sync::store::{Category, LocalStore, MemoryStore, Tables};
use refdata_sync::sync::errors::StageFailure;
use refdata_sync::sync::stages::StageContext;
use refdata_sync::sync::taxa::{TaxaRequest, TaxaSync};
use refdata_sync::sync::{
	DataSyncStatus, Params, ServerStatus, SyncConfig, SyncOrchestrator, SyncStage, SyncState,
};

fn dataset_payload(ids: &[i64]) -> serde_json::Value {
	json!({
		"data": ids
			.iter()
			.map(|id| json!({
				"id_dataset": id,
				"dataset_name": format!("Dataset {}", id),
				"active": true,
				"modules": [{ "module_code": "OCCTAX" }]
			}))
			.collect::<Vec<_>>()
	})
}

fn user(id: i64) -> UserRecord {
	UserRecord {
		id,
		last_name: Some(format!("Observer {}", id)),
		first_name: None,
	}
}

fn scoped_value(id: i64, scopes: &[(&str, &str)]) -> NomenclatureRecord {
	NomenclatureRecord {
		id,
		code: id.to_string(),
		hierarchy: None,
		label_default: None,
		taxonomy: scopes
			.iter()
			.map(|(kingdom, group)| TaxonomyScope {
				kingdom: Some(kingdom.to_string()),
				group: Some(group.to_string()),
			})
			.collect(),
	}
}

fn nomenclatures() -> Vec<NomenclatureTypeTree> {
	vec![NomenclatureTypeTree {
		id: 7,
		mnemonic: "STATUT_BIO".to_string(),
		label_default: Some("Biological status".to_string()),
		values: vec![
			scoped_value(29, &[("Animalia", ANY)]),
			scoped_value(30, &[("Animalia", ANY)]),
		],
	}]
}

fn taxon(id: i64) -> TaxonRecord {
	TaxonRecord {
		id,
		name: format!("Taxon {}", id),
		common_name: None,
		kingdom: Some("Animalia".to_string()),
		group: Some("Oiseaux".to_string()),
	}
}

fn remote() -> MockGateway {
	MockGateway::new()
		.with_datasets(dataset_payload(&[1, 2]))
		.with_users(vec![user(1), user(2)])
		.with_taxonomy_ranks(json!({ "Animalia": ["Oiseaux"] }))
		.with_nomenclatures(nomenclatures())
		.with_default_nomenclatures(json!({ "STATUT_BIO": 29, "FOO": 30 }))
		.with_taxa(vec![taxon(1), taxon(2), taxon(3)])
}

fn previous_state() -> Tables {
	Tables {
		datasets: vec![Dataset {
			id: 9,
			module_code: "OCCTAX".to_string(),
			name: "Previous".to_string(),
			description: None,
			active: true,
			created_at: None,
		}],
		observers: vec![Observer {
			id: 9,
			last_name: Some("Previous".to_string()),
			first_name: None,
		}],
		..Tables::default()
	}
}

fn orchestrator(gateway: &MockGateway, store: &MemoryStore) -> SyncOrchestrator {
	SyncOrchestrator::new(
		Arc::new(gateway.clone()),
		Arc::new(store.clone()),
		SyncConfig::default(),
	)
}

fn params() -> Params {
	Params::new(1).with_additional_data(false)
}

async fn run(gateway: &MockGateway, store: &MemoryStore, params: Params) -> Vec<DataSyncStatus> {
	orchestrator(gateway, store).run(params).collect().await
}

#[tokio::test]
async fn full_run_reports_stages_in_order() {
	let store = MemoryStore::new();
	let events = run(&remote(), &store, params()).await;

	assert!(events.iter().all(|e| !e.is_failed()));
	let succeeded: Vec<_> = events
		.iter()
		.filter(|e| e.state == SyncState::Succeeded)
		.map(|e| (e.stage, e.count.unwrap_or_default()))
		.collect();
	assert_eq!(
		succeeded,
		vec![
			(SyncStage::Datasets, 2),
			(SyncStage::Observers, 2),
			(SyncStage::TaxonomyRanks, 2),
			(SyncStage::NomenclatureTypes, 1),
			(SyncStage::Nomenclatures, 2),
			(SyncStage::NomenclatureTaxonomy, 2),
			(SyncStage::DefaultNomenclatures, 1),
			(SyncStage::Taxa, 3),
		]
	);

	let tables = store.snapshot().await;
	assert_eq!(tables.datasets.len(), 2);
	assert_eq!(tables.taxa.len(), 3);
}

#[tokio::test]
async fn datasets_are_replaced_wholesale() {
	let store = MemoryStore::with_tables(previous_state());
	run(&remote(), &store, params()).await;

	let ids: Vec<i64> = store.snapshot().await.datasets.iter().map(|d| d.id).collect();
	assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn identical_runs_are_idempotent() {
	let store = MemoryStore::with_tables(previous_state());
	let gateway = remote();

	let first_events = run(&gateway, &store, params()).await;
	let first_state = store.snapshot().await;
	let second_events = run(&gateway, &store, params()).await;

	assert_eq!(first_events, second_events);
	assert_eq!(first_state, store.snapshot().await);
}

#[tokio::test]
async fn failure_in_nomenclature_rolls_everything_back() {
	let store = MemoryStore::with_tables(previous_state());
	let gateway = remote().fail("get_nomenclatures", GatewayError::Unauthorized);

	let events = run(&gateway, &store, params()).await;

	assert!(events.contains(&DataSyncStatus::succeeded(SyncStage::Datasets, 2)));
	assert!(events.contains(&DataSyncStatus::succeeded(SyncStage::Observers, 2)));
	let last = events.last().unwrap();
	assert!(last.is_failed());
	assert_eq!(last.stage, SyncStage::NomenclatureTypes);
	assert_eq!(last.server_status, Some(ServerStatus::Unauthorized));
	assert_eq!(events.iter().filter(|e| e.is_failed()).count(), 1);

	assert_eq!(store.snapshot().await, previous_state());
	assert!(!gateway.calls().contains(&"get_taxa"));
}

#[tokio::test]
async fn empty_observer_list_leaves_observers_untouched() {
	let store = MemoryStore::with_tables(previous_state()).fail_writes_to(Category::Observers);
	let gateway = remote().with_users(Vec::new());

	let events = run(&gateway, &store, params()).await;

	assert!(events.contains(&DataSyncStatus::succeeded(SyncStage::Observers, 0)));
	assert!(events.iter().all(|e| !e.is_failed()));
	assert_eq!(store.snapshot().await.observers, previous_state().observers);
}

#[tokio::test]
async fn defaults_for_unknown_types_are_dropped() {
	let store = MemoryStore::new();
	let gateway = remote().with_default_nomenclatures(json!({ "FOO": 29, "STATUT_BIO": 30 }));

	run(&gateway, &store, params()).await;

	let defaults = store.snapshot().await.default_nomenclatures;
	assert_eq!(defaults.len(), 1);
	assert_eq!(defaults[0].nomenclature_id, 30);
}

#[tokio::test]
async fn shared_taxonomic_scope_is_stored_once() {
	let store = MemoryStore::new();
	let gateway = remote().with_taxonomy_ranks(json!({}));

	run(&gateway, &store, params()).await;

	let taxonomy = store.snapshot().await.taxonomy;
	assert_eq!(
		taxonomy
			.iter()
			.filter(|t| **t == Taxonomy::new("Animalia", ANY))
			.count(),
		1
	);
}

#[tokio::test]
async fn wildcard_ranks_survive_the_next_run() {
	let store = MemoryStore::new();
	run(&remote(), &store, params()).await;
	run(&remote(), &store, params()).await;

	let taxonomy = store.snapshot().await.taxonomy;
	assert!(taxonomy.contains(&Taxonomy::new("Animalia", ANY)));
	assert!(taxonomy.contains(&Taxonomy::new("Animalia", "Oiseaux")));
}

#[tokio::test]
async fn linked_wildcard_rank_survives_a_run_without_nomenclatures() {
	let link = NomenclatureTaxonomy {
		nomenclature_id: 10,
		taxonomy: Taxonomy::wildcard(),
	};
	let store = MemoryStore::with_tables(Tables {
		taxonomy: vec![Taxonomy::wildcard()],
		nomenclature_taxonomy: vec![link.clone()],
		..Tables::default()
	});
	let gateway = remote().with_nomenclatures(Vec::new());

	let events = run(&gateway, &store, params()).await;

	assert!(events.iter().all(|e| !e.is_failed()));
	let tables = store.snapshot().await;
	assert_eq!(tables.nomenclature_taxonomy, vec![link]);
	assert_eq!(
		tables.taxonomy,
		vec![
			Taxonomy::wildcard(),
			Taxonomy::new("Animalia", ANY),
			Taxonomy::new("Animalia", "Oiseaux")
		]
	);
}

#[tokio::test]
async fn other_modules_keep_their_datasets() {
	let monitoring = Dataset {
		id: 5,
		module_code: "MONITORING".to_string(),
		name: "Monitoring".to_string(),
		description: None,
		active: true,
		created_at: None,
	};
	let mut tables = previous_state();
	tables.datasets.push(monitoring);
	let store = MemoryStore::with_tables(tables);

	run(&remote(), &store, params()).await;

	let datasets: Vec<_> = store
		.snapshot()
		.await
		.datasets
		.into_iter()
		.map(|d| (d.id, d.module_code))
		.collect();
	assert_eq!(
		datasets,
		vec![
			(5, "MONITORING".to_string()),
			(1, "OCCTAX".to_string()),
			(2, "OCCTAX".to_string())
		]
	);
}

#[tokio::test]
async fn unauthorized_is_classified() {
	let gateway = remote().fail("get_users", GatewayError::Unauthorized);
	let events = run(&gateway, &MemoryStore::new(), params()).await;

	let failed = events.last().unwrap();
	assert_eq!(failed.state, SyncState::Failed);
	assert_eq!(failed.stage, SyncStage::Observers);
	assert_eq!(failed.server_status, Some(ServerStatus::Unauthorized));
	assert_eq!(failed.message.as_deref(), Some("not connected"));
}

#[tokio::test]
async fn network_errors_are_not_classified() {
	let gateway = remote().fail("get_taxa", GatewayError::Network("timed out".to_string()));
	let store = MemoryStore::new();
	let events = run(&gateway, &store, params()).await;

	let failed = events.last().unwrap();
	assert_eq!(failed.stage, SyncStage::Taxa);
	assert_eq!(failed.server_status, None);
	assert_eq!(failed.message.as_deref(), Some("failed to synchronize taxa"));
	assert_eq!(store.snapshot().await, Tables::default());
}

#[tokio::test]
async fn persistence_failure_is_fatal() {
	let store = MemoryStore::with_tables(previous_state()).fail_writes_to(Category::Taxa);
	let events = run(&remote(), &store, params()).await;

	let failed = events.last().unwrap();
	assert!(failed.is_failed());
	assert_eq!(failed.stage, SyncStage::Taxa);
	assert_eq!(store.snapshot().await, previous_state());
}

#[tokio::test]
async fn unconfigured_gateway_fails_without_touching_the_store() {
	let store = MemoryStore::with_tables(previous_state());
	let events = run(&MockGateway::unconfigured(), &store, params()).await;

	let failed = events.last().unwrap();
	assert_eq!(failed.stage, SyncStage::Connectivity);
	assert_eq!(failed.server_status, Some(ServerStatus::InternalServerError));
	assert_eq!(failed.message.as_deref(), Some("server is not configured"));
	assert_eq!(store.snapshot().await, previous_state());
}

#[tokio::test]
async fn busy_store_fails_the_run() {
	let store = MemoryStore::new();
	let _other_run = store.begin().await.unwrap();

	let events = run(&remote(), &store, params()).await;

	let failed = events.last().unwrap();
	assert!(failed.is_failed());
	assert_eq!(failed.stage, SyncStage::Commit);
}

#[tokio::test]
async fn additional_fields_only_when_requested() {
	let gateway = remote().with_additional_fields(json!([{
		"id_field": 1,
		"field_name": "weather",
		"modules": [{ "module_code": "OCCTAX" }]
	}]));
	let store = MemoryStore::new();

	run(&gateway, &store, params()).await;
	assert!(!gateway.calls().contains(&"get_additional_fields"));
	assert!(store.snapshot().await.additional_fields.is_empty());

	let events = run(&gateway, &store, params().with_additional_fields(true)).await;
	assert_eq!(
		events.last(),
		Some(&DataSyncStatus::succeeded(SyncStage::AdditionalFields, 1))
	);
	assert_eq!(store.snapshot().await.additional_fields.len(), 1);
}

#[tokio::test]
async fn cancelled_before_start() {
	let gateway = remote();
	let cancel = CancellationToken::new();
	cancel.cancel();

	let events: Vec<_> = orchestrator(&gateway, &MemoryStore::new())
		.run_with_cancellation(params(), cancel)
		.collect()
		.await;

	assert_eq!(events.len(), 1);
	assert_eq!(events[0].message.as_deref(), Some("synchronization cancelled"));
	assert_eq!(events[0].server_status, None);
	assert!(gateway.calls().is_empty());
}

/// Cancels the run from inside the taxa stage.
struct CancellingTaxaSync(CancellationToken);

#[async_trait::async_trait]
impl TaxaSync for CancellingTaxaSync {
	async fn sync_taxa(
		&self,
		ctx: &mut StageContext<'_>,
		_request: &TaxaRequest,
	) -> Result<(), StageFailure> {
		self.0.cancel();
		ctx.emit(DataSyncStatus::succeeded(SyncStage::Taxa, 0)).await;
		Ok(())
	}

	fn name(&self) -> &'static str {
		"cancelling"
	}
}

#[tokio::test]
async fn cancellation_during_a_run_rolls_back() {
	let store = MemoryStore::with_tables(previous_state());
	let cancel = CancellationToken::new();
	let orchestrator = orchestrator(&remote(), &store)
		.with_taxa_sync(Arc::new(CancellingTaxaSync(cancel.clone())));

	let events: Vec<_> = orchestrator
		.run_with_cancellation(params().with_additional_fields(true), cancel)
		.collect()
		.await;

	let last = events.last().unwrap();
	assert!(last.is_failed());
	assert_eq!(last.stage, SyncStage::AdditionalFields);
	assert_eq!(last.message.as_deref(), Some("synchronization cancelled"));
	assert_eq!(store.snapshot().await, previous_state());
}

#[tokio::test]
async fn dropping_the_stream_does_not_stop_the_run() {
	let store = MemoryStore::new();
	drop(orchestrator(&remote(), &store).run(params()));

	let mut committed = false;
	for _ in 0..200 {
		if !store.snapshot().await.taxa.is_empty() {
			committed = true;
			break;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	assert!(committed);
}

#[tokio::test]
async fn custom_status_buffer_keeps_order() {
	let store = MemoryStore::new();
	let orchestrator = SyncOrchestrator::new(
		Arc::new(remote()),
		Arc::new(store.clone()),
		SyncConfig::default().with_status_buffer(64),
	);

	let events: Vec<_> = orchestrator.run(params()).collect().await;
	let buffered: Vec<_> = orchestrator.run(params()).collect().await;
	assert_eq!(events, buffered);
	assert_eq!(events[0].stage, SyncStage::Connectivity);
}
