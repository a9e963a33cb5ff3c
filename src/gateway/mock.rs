use super::types::*;

use reqwest::Url;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A scripted gateway for tests and offline runs.
///
/// Payloads default to empty collections. Any call can be made to fail with
/// [`fail`](Self::fail); every call is recorded by name and can be inspected with
/// [`calls`](Self::calls).
#[derive(Debug, Clone)]
pub struct MockGateway {
	urls: Option<ServerUrls>,
	ready: bool,
	datasets: Value,
	users: Vec<UserRecord>,
	taxonomy_ranks: Value,
	nomenclatures: Vec<NomenclatureTypeTree>,
	default_nomenclatures: Value,
	taxa: Vec<TaxonRecord>,
	taxa_areas: Vec<TaxonAreaRecord>,
	additional_fields: Value,
	ignore_offset: bool,
	failures: HashMap<&'static str, GatewayError>,
	calls: Arc<Mutex<Vec<&'static str>>>,
}

impl Default for MockGateway {
	fn default() -> Self {
		Self::new()
	}
}

impl MockGateway {
	/// Creates a configured, ready mock returning empty payloads.
	pub fn new() -> Self {
		let urls = match (
			Url::parse("http://localhost/geonature/"),
			Url::parse("http://localhost/taxhub/"),
		) {
			(Ok(geonature), Ok(taxhub)) => Some(ServerUrls { geonature, taxhub }),
			_ => None,
		};

		Self {
			urls,
			ready: true,
			datasets: json!([]),
			users: Vec::new(),
			taxonomy_ranks: json!({}),
			nomenclatures: Vec::new(),
			default_nomenclatures: json!({}),
			taxa: Vec::new(),
			taxa_areas: Vec::new(),
			additional_fields: json!([]),
			ignore_offset: false,
			failures: HashMap::new(),
			calls: Arc::new(Mutex::new(Vec::new())),
		}
	}

	/// Creates a mock without base URLs.
	pub fn unconfigured() -> Self {
		Self {
			urls: None,
			ready: false,
			..Self::new()
		}
	}

	pub fn with_ready(mut self, ready: bool) -> Self {
		self.ready = ready;
		self
	}

	pub fn with_datasets(mut self, payload: Value) -> Self {
		self.datasets = payload;
		self
	}

	pub fn with_users(mut self, users: Vec<UserRecord>) -> Self {
		self.users = users;
		self
	}

	pub fn with_taxonomy_ranks(mut self, payload: Value) -> Self {
		self.taxonomy_ranks = payload;
		self
	}

	pub fn with_nomenclatures(mut self, nomenclatures: Vec<NomenclatureTypeTree>) -> Self {
		self.nomenclatures = nomenclatures;
		self
	}

	pub fn with_default_nomenclatures(mut self, payload: Value) -> Self {
		self.default_nomenclatures = payload;
		self
	}

	pub fn with_taxa(mut self, taxa: Vec<TaxonRecord>) -> Self {
		self.taxa = taxa;
		self
	}

	pub fn with_taxa_areas(mut self, taxa_areas: Vec<TaxonAreaRecord>) -> Self {
		self.taxa_areas = taxa_areas;
		self
	}

	pub fn with_additional_fields(mut self, payload: Value) -> Self {
		self.additional_fields = payload;
		self
	}

	/// Serve the first page of taxa and taxa areas whatever offset is asked for.
	pub fn ignoring_offset(mut self) -> Self {
		self.ignore_offset = true;
		self
	}

	/// Makes the named call (e.g. `"get_users"`) fail with `error`.
	pub fn fail(mut self, call: &'static str, error: GatewayError) -> Self {
		self.failures.insert(call, error);
		self
	}

	/// Names of the calls made so far, in order.
	pub fn calls(&self) -> Vec<&'static str> {
		self.calls
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.clone()
	}

	fn record(&self, call: &'static str) -> Result<(), GatewayError> {
		self.calls
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.push(call);

		match self.failures.get(call) {
			Some(error) => Err(error.clone()),
			None => Ok(()),
		}
	}

	fn offset(&self, offset: usize) -> usize {
		if self.ignore_offset { 0 } else { offset }
	}
}

fn page<T: Clone>(rows: &[T], limit: usize, offset: usize) -> Vec<T> {
	rows.iter().skip(offset).take(limit).cloned().collect()
}

#[async_trait::async_trait]
impl RemoteDataGateway for MockGateway {
	fn base_urls(&self) -> Result<ServerUrls, GatewayError> {
		self.urls
			.clone()
			.ok_or_else(|| GatewayError::Configuration("No server URLs configured".to_string()))
	}

	async fn check_settings(&self) -> bool {
		self.ready
	}

	async fn get_meta_datasets(&self, _module_code: &str) -> Result<Value, GatewayError> {
		self.record("get_meta_datasets")?;
		Ok(self.datasets.clone())
	}

	async fn get_users(&self, _menu_id: i64) -> Result<Vec<UserRecord>, GatewayError> {
		self.record("get_users")?;
		Ok(self.users.clone())
	}

	async fn get_taxonomy_ranks(&self) -> Result<Value, GatewayError> {
		self.record("get_taxonomy_ranks")?;
		Ok(self.taxonomy_ranks.clone())
	}

	async fn get_nomenclatures(&self) -> Result<Vec<NomenclatureTypeTree>, GatewayError> {
		self.record("get_nomenclatures")?;
		Ok(self.nomenclatures.clone())
	}

	async fn get_default_nomenclatures_values(
		&self,
		_module_code: &str,
	) -> Result<Value, GatewayError> {
		self.record("get_default_nomenclatures_values")?;
		Ok(self.default_nomenclatures.clone())
	}

	async fn get_taxa(
		&self,
		_list_id: i64,
		limit: usize,
		offset: usize,
	) -> Result<Vec<TaxonRecord>, GatewayError> {
		self.record("get_taxa")?;
		Ok(page(&self.taxa, limit, self.offset(offset)))
	}

	async fn get_taxa_areas(
		&self,
		_code_area_type: Option<&str>,
		limit: usize,
		offset: usize,
	) -> Result<Vec<TaxonAreaRecord>, GatewayError> {
		self.record("get_taxa_areas")?;
		Ok(page(&self.taxa_areas, limit, self.offset(offset)))
	}

	async fn get_additional_fields(&self, _module_code: &str) -> Result<Value, GatewayError> {
		self.record("get_additional_fields")?;
		Ok(self.additional_fields.clone())
	}
}
