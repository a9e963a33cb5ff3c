//! Types for the remote reference data service

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Base URLs of the two services reference data is pulled from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerUrls {
	/// GeoNature: datasets, users, nomenclatures, module settings.
	pub geonature: Url,
	/// TaxHub: taxonomy and taxa lists.
	pub taxhub: Url,
}

/// A user as listed by a users menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
	#[serde(rename = "id_role")]
	pub id: i64,
	#[serde(rename = "nom_role", default)]
	pub last_name: Option<String>,
	#[serde(rename = "prenom_role", default)]
	pub first_name: Option<String>,
}

/// A nomenclature type together with its values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NomenclatureTypeTree {
	#[serde(rename = "id_type")]
	pub id: i64,
	#[serde(rename = "mnemonique")]
	pub mnemonic: String,
	#[serde(default)]
	pub label_default: Option<String>,
	#[serde(rename = "nomenclatures", default)]
	pub values: Vec<NomenclatureRecord>,
}

/// A single nomenclature value as returned inside a [`NomenclatureTypeTree`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NomenclatureRecord {
	#[serde(rename = "id_nomenclature")]
	pub id: i64,
	#[serde(rename = "cd_nomenclature")]
	pub code: String,
	#[serde(default)]
	pub hierarchy: Option<String>,
	#[serde(default)]
	pub label_default: Option<String>,
	/// Taxonomic scopes this value applies to; empty means every taxon.
	#[serde(rename = "taxref", default)]
	pub taxonomy: Vec<TaxonomyScope>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyScope {
	#[serde(rename = "regne", default)]
	pub kingdom: Option<String>,
	#[serde(rename = "group2_inpn", default)]
	pub group: Option<String>,
}

/// A taxon of a taxa list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonRecord {
	#[serde(rename = "cd_nom")]
	pub id: i64,
	#[serde(rename = "lb_nom")]
	pub name: String,
	#[serde(rename = "nom_vern", default)]
	pub common_name: Option<String>,
	#[serde(rename = "regne", default)]
	pub kingdom: Option<String>,
	#[serde(rename = "group2_inpn", default)]
	pub group: Option<String>,
}

/// Observation statistics of a taxon in an area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonAreaRecord {
	#[serde(rename = "cd_nom")]
	pub taxon_id: i64,
	#[serde(rename = "id_area")]
	pub area_id: i64,
	#[serde(default)]
	pub color: Option<String>,
	#[serde(rename = "nb_obs", default)]
	pub number_of_observers: Option<i64>,
	#[serde(rename = "last_date", default)]
	pub last_date: Option<String>,
}

/// Error types for remote reference data calls
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
	#[error("Configuration error: {0}")]
	Configuration(String),

	#[error("Unauthorized")]
	Unauthorized,

	#[error("Server error: HTTP {0}")]
	Server(u16),

	#[error("Unexpected HTTP status: {0}")]
	Status(u16),

	#[error("Network error: {0}")]
	Network(String),

	#[error("Malformed payload: {0}")]
	Decode(String),
}

impl GatewayError {
	/// Classify a non-success HTTP status.
	pub fn from_status(status: u16) -> Self {
		match status {
			401 | 403 => GatewayError::Unauthorized,
			500..=599 => GatewayError::Server(status),
			_ => GatewayError::Status(status),
		}
	}
}

impl From<reqwest::Error> for GatewayError {
	fn from(e: reqwest::Error) -> Self {
		match e.status() {
			Some(status) => GatewayError::from_status(status.as_u16()),
			None if e.is_decode() => GatewayError::Decode(e.to_string()),
			None => GatewayError::Network(e.to_string()),
		}
	}
}

impl From<serde_json::Error> for GatewayError {
	fn from(e: serde_json::Error) -> Self {
		GatewayError::Decode(e.to_string())
	}
}

/// Typed, already-authenticated access to the remote reference data service.
///
/// Calls returning [`Value`] hand back loosely-typed payloads that the pipeline validates itself;
/// the others are deserialized by the gateway and fail with [`GatewayError::Decode`] when the
/// payload does not match.
#[async_trait::async_trait]
pub trait RemoteDataGateway: Send + Sync {
	fn base_urls(&self) -> Result<ServerUrls, GatewayError>;

	/// Whether the gateway is ready to serve requests.
	async fn check_settings(&self) -> bool;

	async fn get_meta_datasets(&self, module_code: &str) -> Result<Value, GatewayError>;

	async fn get_users(&self, menu_id: i64) -> Result<Vec<UserRecord>, GatewayError>;

	async fn get_taxonomy_ranks(&self) -> Result<Value, GatewayError>;

	async fn get_nomenclatures(&self) -> Result<Vec<NomenclatureTypeTree>, GatewayError>;

	async fn get_default_nomenclatures_values(
		&self,
		module_code: &str,
	) -> Result<Value, GatewayError>;

	async fn get_taxa(
		&self,
		list_id: i64,
		limit: usize,
		offset: usize,
	) -> Result<Vec<TaxonRecord>, GatewayError>;

	async fn get_taxa_areas(
		&self,
		code_area_type: Option<&str>,
		limit: usize,
		offset: usize,
	) -> Result<Vec<TaxonAreaRecord>, GatewayError>;

	async fn get_additional_fields(&self, module_code: &str) -> Result<Value, GatewayError>;
}
