//! Reference data rows persisted in the local store.
//!
//! Every type here is a plain row: the pipeline builds them from remote payloads and the store
//! keeps them per category. Each row exposes a primary key through [`Entity`] so that stores can
//! implement "insert replaces" and "insert or ignore" semantics without knowing the row layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wildcard kingdom/group value meaning "applies to every kingdom or group".
pub const ANY: &str = "any";

/// A row with a primary key.
pub trait Entity: Clone + PartialEq + Send + Sync + 'static {
	type Key: Eq + std::hash::Hash + std::fmt::Debug;

	fn key(&self) -> Self::Key;
}

/// A dataset available for the configured module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
	pub id: i64,
	pub module_code: String,
	pub name: String,
	pub description: Option<String>,
	pub active: bool,
	pub created_at: Option<DateTime<Utc>>,
}

impl Entity for Dataset {
	type Key = (i64, String);

	fn key(&self) -> Self::Key {
		(self.id, self.module_code.clone())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observer {
	pub id: i64,
	pub last_name: Option<String>,
	pub first_name: Option<String>,
}

impl Entity for Observer {
	type Key = i64;

	fn key(&self) -> Self::Key {
		self.id
	}
}

/// A taxonomy rank: a kingdom and a group, either of which may be [`ANY`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Taxonomy {
	pub kingdom: String,
	pub group: String,
}

impl Taxonomy {
	pub fn new(kingdom: impl Into<String>, group: impl Into<String>) -> Self {
		Self {
			kingdom: kingdom.into(),
			group: group.into(),
		}
	}

	/// The `(ANY, ANY)` pair.
	pub fn wildcard() -> Self {
		Self::new(ANY, ANY)
	}

	pub fn is_wildcard(&self) -> bool {
		self.kingdom == ANY && self.group == ANY
	}
}

impl Entity for Taxonomy {
	type Key = (String, String);

	fn key(&self) -> Self::Key {
		(self.kingdom.clone(), self.group.clone())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NomenclatureType {
	pub id: i64,
	pub mnemonic: String,
	pub default_label: Option<String>,
}

impl Entity for NomenclatureType {
	type Key = i64;

	fn key(&self) -> Self::Key {
		self.id
	}
}

/// A nomenclature value owned by a [`NomenclatureType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nomenclature {
	pub id: i64,
	pub code: String,
	/// Display ordering key within the owning type.
	pub hierarchy: String,
	pub default_label: Option<String>,
	pub type_id: i64,
}

impl Entity for Nomenclature {
	type Key = i64;

	fn key(&self) -> Self::Key {
		self.id
	}
}

/// Links a nomenclature value to the taxonomic scope it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NomenclatureTaxonomy {
	pub nomenclature_id: i64,
	pub taxonomy: Taxonomy,
}

impl Entity for NomenclatureTaxonomy {
	type Key = (i64, String, String);

	fn key(&self) -> Self::Key {
		(
			self.nomenclature_id,
			self.taxonomy.kingdom.clone(),
			self.taxonomy.group.clone(),
		)
	}
}

/// The default nomenclature value a module preselects for a type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultNomenclature {
	pub module_code: String,
	pub nomenclature_id: i64,
}

impl Entity for DefaultNomenclature {
	type Key = (String, i64);

	fn key(&self) -> Self::Key {
		(self.module_code.clone(), self.nomenclature_id)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxon {
	pub id: i64,
	pub name: String,
	pub common_name: Option<String>,
	pub taxonomy: Taxonomy,
}

impl Entity for Taxon {
	type Key = i64;

	fn key(&self) -> Self::Key {
		self.id
	}
}

/// Observation statistics of a taxon within a geographic area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonArea {
	pub taxon_id: i64,
	pub area_id: i64,
	pub color: Option<String>,
	pub number_of_observers: i64,
	pub last_updated_at: Option<DateTime<Utc>>,
}

impl Entity for TaxonArea {
	type Key = (i64, i64);

	fn key(&self) -> Self::Key {
		(self.taxon_id, self.area_id)
	}
}

/// A module-specific form field defined on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalField {
	pub id: i64,
	pub module_code: String,
	pub name: String,
	pub label: Option<String>,
	pub widget_type: String,
	pub nomenclature_type_mnemonic: Option<String>,
	pub default_value: Option<String>,
	pub object_codes: Vec<String>,
}

impl Entity for AdditionalField {
	type Key = i64;

	fn key(&self) -> Self::Key {
		self.id
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalFieldValue {
	pub field_id: i64,
	pub value: String,
	pub label: Option<String>,
}

impl Entity for AdditionalFieldValue {
	type Key = (i64, String);

	fn key(&self) -> Self::Key {
		(self.field_id, self.value.clone())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalFieldDataset {
	pub field_id: i64,
	pub dataset_id: i64,
}

impl Entity for AdditionalFieldDataset {
	type Key = (i64, i64);

	fn key(&self) -> Self::Key {
		(self.field_id, self.dataset_id)
	}
}
