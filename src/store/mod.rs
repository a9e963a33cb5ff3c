//! Local storage abstraction for synchronized reference data.
//!
//! The pipeline never talks to a concrete database. It opens one [`StoreTransaction`] per run
//! through [`LocalStore::begin`] and issues category-level writes on it: `delete_all` (or its
//! narrower `delete_module` and `delete_unlinked_taxonomy` forms), `insert` (replace rows sharing
//! a primary key) and `insert_or_ignore` (keep existing rows). Nothing
//! becomes visible to readers until [`StoreTransaction::commit`]; [`StoreTransaction::rollback`]
//! discards every write of the run.

/// In-memory, snapshot-isolated store implementation
mod memory;

pub use memory::{MemoryStore, Tables};

use crate::model::{
	AdditionalField, AdditionalFieldDataset, AdditionalFieldValue, Dataset, DefaultNomenclature,
	Nomenclature, NomenclatureTaxonomy, NomenclatureType, Observer, Taxon, TaxonArea, Taxonomy,
};

/// Entity categories managed by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
	Datasets,
	Observers,
	Taxonomy,
	NomenclatureTypes,
	Nomenclatures,
	NomenclatureTaxonomy,
	DefaultNomenclatures,
	Taxa,
	TaxaAreas,
	AdditionalFields,
	AdditionalFieldValues,
	AdditionalFieldDatasets,
}

impl Category {
	/// Whether rows of this category carry the code of the module they belong to.
	pub fn is_module_scoped(&self) -> bool {
		matches!(
			self,
			Category::Datasets | Category::DefaultNomenclatures | Category::AdditionalFields
		)
	}
}

impl std::fmt::Display for Category {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			Category::Datasets => "datasets",
			Category::Observers => "observers",
			Category::Taxonomy => "taxonomy",
			Category::NomenclatureTypes => "nomenclature_types",
			Category::Nomenclatures => "nomenclatures",
			Category::NomenclatureTaxonomy => "nomenclature_taxonomy",
			Category::DefaultNomenclatures => "default_nomenclatures",
			Category::Taxa => "taxa",
			Category::TaxaAreas => "taxa_areas",
			Category::AdditionalFields => "additional_fields",
			Category::AdditionalFieldValues => "additional_field_values",
			Category::AdditionalFieldDatasets => "additional_field_datasets",
		};
		f.write_str(name)
	}
}

/// A batch of rows for a single category.
#[derive(Debug, Clone, PartialEq)]
pub enum Rows {
	Datasets(Vec<Dataset>),
	Observers(Vec<Observer>),
	Taxonomy(Vec<Taxonomy>),
	NomenclatureTypes(Vec<NomenclatureType>),
	Nomenclatures(Vec<Nomenclature>),
	NomenclatureTaxonomy(Vec<NomenclatureTaxonomy>),
	DefaultNomenclatures(Vec<DefaultNomenclature>),
	Taxa(Vec<Taxon>),
	TaxaAreas(Vec<TaxonArea>),
	AdditionalFields(Vec<AdditionalField>),
	AdditionalFieldValues(Vec<AdditionalFieldValue>),
	AdditionalFieldDatasets(Vec<AdditionalFieldDataset>),
}

impl Rows {
	pub fn category(&self) -> Category {
		match self {
			Rows::Datasets(_) => Category::Datasets,
			Rows::Observers(_) => Category::Observers,
			Rows::Taxonomy(_) => Category::Taxonomy,
			Rows::NomenclatureTypes(_) => Category::NomenclatureTypes,
			Rows::Nomenclatures(_) => Category::Nomenclatures,
			Rows::NomenclatureTaxonomy(_) => Category::NomenclatureTaxonomy,
			Rows::DefaultNomenclatures(_) => Category::DefaultNomenclatures,
			Rows::Taxa(_) => Category::Taxa,
			Rows::TaxaAreas(_) => Category::TaxaAreas,
			Rows::AdditionalFields(_) => Category::AdditionalFields,
			Rows::AdditionalFieldValues(_) => Category::AdditionalFieldValues,
			Rows::AdditionalFieldDatasets(_) => Category::AdditionalFieldDatasets,
		}
	}

	pub fn len(&self) -> usize {
		match self {
			Rows::Datasets(rows) => rows.len(),
			Rows::Observers(rows) => rows.len(),
			Rows::Taxonomy(rows) => rows.len(),
			Rows::NomenclatureTypes(rows) => rows.len(),
			Rows::Nomenclatures(rows) => rows.len(),
			Rows::NomenclatureTaxonomy(rows) => rows.len(),
			Rows::DefaultNomenclatures(rows) => rows.len(),
			Rows::Taxa(rows) => rows.len(),
			Rows::TaxaAreas(rows) => rows.len(),
			Rows::AdditionalFields(rows) => rows.len(),
			Rows::AdditionalFieldValues(rows) => rows.len(),
			Rows::AdditionalFieldDatasets(rows) => rows.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Errors raised by the local store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("failed to write {category}: {reason}")]
	WriteFailed { category: Category, reason: String },

	#[error("another synchronization already holds the store")]
	Conflict,
}

/// Entry point of a local store: hands out exclusive write transactions.
#[async_trait::async_trait]
pub trait LocalStore: Send + Sync {
	/// Open the transactional scope of one synchronization run.
	async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

/// Writes of one synchronization run.
///
/// Dropping a transaction without committing has the same effect as [`rollback`](Self::rollback).
#[async_trait::async_trait]
pub trait StoreTransaction: Send {
	async fn delete_all(&mut self, category: Category) -> Result<(), StoreError>;

	/// Delete the rows of a module-scoped category that belong to `module_code`.
	///
	/// Fails with [`StoreError::WriteFailed`] for categories that carry no module code.
	async fn delete_module(
		&mut self,
		category: Category,
		module_code: &str,
	) -> Result<(), StoreError>;

	/// Delete the taxonomy ranks that no nomenclature link references.
	async fn delete_unlinked_taxonomy(&mut self) -> Result<(), StoreError>;

	async fn insert(&mut self, rows: Rows) -> Result<(), StoreError>;

	async fn insert_or_ignore(&mut self, rows: Rows) -> Result<(), StoreError>;

	/// Delete every row of the category, then insert `rows`.
	async fn replace_all(&mut self, rows: Rows) -> Result<(), StoreError> {
		self.delete_all(rows.category()).await?;
		self.insert(rows).await
	}

	async fn commit(self: Box<Self>) -> Result<(), StoreError>;

	async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rows_report_their_category() {
		let rows = Rows::Taxonomy(vec![Taxonomy::wildcard()]);
		assert_eq!(rows.category(), Category::Taxonomy);
		assert_eq!(rows.len(), 1);
		assert!(Rows::Observers(Vec::new()).is_empty());
	}

	#[test]
	fn module_scoped_categories() {
		assert!(Category::Datasets.is_module_scoped());
		assert!(Category::DefaultNomenclatures.is_module_scoped());
		assert!(!Category::Taxonomy.is_module_scoped());
	}

	#[test]
	fn error_display() {
		let err = StoreError::WriteFailed {
			category: Category::NomenclatureTypes,
			reason: "disk full".to_string(),
		};
		assert_eq!(
			err.to_string(),
			"failed to write nomenclature_types: disk full"
		);
	}
}
