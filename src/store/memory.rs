use crate::model::{
	AdditionalField, AdditionalFieldDataset, AdditionalFieldValue, Dataset, DefaultNomenclature,
	Entity, Nomenclature, NomenclatureTaxonomy, NomenclatureType, Observer, Taxon, TaxonArea,
	Taxonomy,
};
use crate::store::{Category, LocalStore, Rows, StoreError, StoreTransaction};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

/// Every category of the store, as plain row vectors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tables {
	pub datasets: Vec<Dataset>,
	pub observers: Vec<Observer>,
	pub taxonomy: Vec<Taxonomy>,
	pub nomenclature_types: Vec<NomenclatureType>,
	pub nomenclatures: Vec<Nomenclature>,
	pub nomenclature_taxonomy: Vec<NomenclatureTaxonomy>,
	pub default_nomenclatures: Vec<DefaultNomenclature>,
	pub taxa: Vec<Taxon>,
	pub taxa_areas: Vec<TaxonArea>,
	pub additional_fields: Vec<AdditionalField>,
	pub additional_field_values: Vec<AdditionalFieldValue>,
	pub additional_field_datasets: Vec<AdditionalFieldDataset>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conflict {
	Replace,
	Ignore,
}

impl Tables {
	/// Number of rows currently held for a category.
	pub fn count(&self, category: Category) -> usize {
		match category {
			Category::Datasets => self.datasets.len(),
			Category::Observers => self.observers.len(),
			Category::Taxonomy => self.taxonomy.len(),
			Category::NomenclatureTypes => self.nomenclature_types.len(),
			Category::Nomenclatures => self.nomenclatures.len(),
			Category::NomenclatureTaxonomy => self.nomenclature_taxonomy.len(),
			Category::DefaultNomenclatures => self.default_nomenclatures.len(),
			Category::Taxa => self.taxa.len(),
			Category::TaxaAreas => self.taxa_areas.len(),
			Category::AdditionalFields => self.additional_fields.len(),
			Category::AdditionalFieldValues => self.additional_field_values.len(),
			Category::AdditionalFieldDatasets => self.additional_field_datasets.len(),
		}
	}

	fn clear(&mut self, category: Category) {
		match category {
			Category::Datasets => self.datasets.clear(),
			Category::Observers => self.observers.clear(),
			Category::Taxonomy => self.taxonomy.clear(),
			Category::NomenclatureTypes => self.nomenclature_types.clear(),
			Category::Nomenclatures => self.nomenclatures.clear(),
			Category::NomenclatureTaxonomy => self.nomenclature_taxonomy.clear(),
			Category::DefaultNomenclatures => self.default_nomenclatures.clear(),
			Category::Taxa => self.taxa.clear(),
			Category::TaxaAreas => self.taxa_areas.clear(),
			Category::AdditionalFields => self.additional_fields.clear(),
			Category::AdditionalFieldValues => self.additional_field_values.clear(),
			Category::AdditionalFieldDatasets => self.additional_field_datasets.clear(),
		}
	}

	fn clear_module(&mut self, category: Category, module_code: &str) {
		match category {
			Category::Datasets => self.datasets.retain(|d| d.module_code != module_code),
			Category::DefaultNomenclatures => self
				.default_nomenclatures
				.retain(|d| d.module_code != module_code),
			Category::AdditionalFields => self
				.additional_fields
				.retain(|f| f.module_code != module_code),
			_ => {}
		}
	}

	fn clear_unlinked_taxonomy(&mut self) {
		let linked: HashSet<&Taxonomy> = self
			.nomenclature_taxonomy
			.iter()
			.map(|link| &link.taxonomy)
			.collect();
		let taxonomy = std::mem::take(&mut self.taxonomy);
		self.taxonomy = taxonomy
			.into_iter()
			.filter(|rank| linked.contains(rank))
			.collect();
	}

	fn write(&mut self, rows: Rows, on_conflict: Conflict) {
		match rows {
			Rows::Datasets(rows) => merge(&mut self.datasets, rows, on_conflict),
			Rows::Observers(rows) => merge(&mut self.observers, rows, on_conflict),
			Rows::Taxonomy(rows) => merge(&mut self.taxonomy, rows, on_conflict),
			Rows::NomenclatureTypes(rows) => merge(&mut self.nomenclature_types, rows, on_conflict),
			Rows::Nomenclatures(rows) => merge(&mut self.nomenclatures, rows, on_conflict),
			Rows::NomenclatureTaxonomy(rows) => {
				merge(&mut self.nomenclature_taxonomy, rows, on_conflict)
			}
			Rows::DefaultNomenclatures(rows) => {
				merge(&mut self.default_nomenclatures, rows, on_conflict)
			}
			Rows::Taxa(rows) => merge(&mut self.taxa, rows, on_conflict),
			Rows::TaxaAreas(rows) => merge(&mut self.taxa_areas, rows, on_conflict),
			Rows::AdditionalFields(rows) => merge(&mut self.additional_fields, rows, on_conflict),
			Rows::AdditionalFieldValues(rows) => {
				merge(&mut self.additional_field_values, rows, on_conflict)
			}
			Rows::AdditionalFieldDatasets(rows) => {
				merge(&mut self.additional_field_datasets, rows, on_conflict)
			}
		}
	}
}

fn merge<E: Entity>(table: &mut Vec<E>, rows: Vec<E>, on_conflict: Conflict) {
	let mut positions: HashMap<E::Key, usize> = table
		.iter()
		.enumerate()
		.map(|(position, row)| (row.key(), position))
		.collect();

	for row in rows {
		match positions.get(&row.key()) {
			Some(&position) => {
				if on_conflict == Conflict::Replace {
					table[position] = row;
				}
			}
			None => {
				positions.insert(row.key(), table.len());
				table.push(row);
			}
		}
	}
}

/// In-memory [`LocalStore`] with snapshot isolation.
///
/// Readers always observe the last committed [`Tables`]. A transaction works on a private copy
/// and holds the writer lock until it is committed, rolled back or dropped, so at most one
/// synchronization writes at a time.
#[derive(Clone, Default)]
pub struct MemoryStore {
	committed: Arc<RwLock<Tables>>,
	writer: Arc<Mutex<()>>,
	failing: HashSet<Category>,
	failing_inserts: HashSet<Category>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Create a store whose committed state starts as `tables`.
	pub fn with_tables(tables: Tables) -> Self {
		Self {
			committed: Arc::new(RwLock::new(tables)),
			..Self::default()
		}
	}

	/// Make every write touching `category` fail with [`StoreError::WriteFailed`].
	pub fn fail_writes_to(mut self, category: Category) -> Self {
		self.failing.insert(category);
		self
	}

	/// Make inserts into `category` fail while deletes still succeed.
	pub fn fail_inserts_into(mut self, category: Category) -> Self {
		self.failing_inserts.insert(category);
		self
	}

	/// Copy of the committed state.
	pub async fn snapshot(&self) -> Tables {
		self.committed.read().await.clone()
	}
}

#[async_trait::async_trait]
impl LocalStore for MemoryStore {
	async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
		let guard = self
			.writer
			.clone()
			.try_lock_owned()
			.map_err(|_| StoreError::Conflict)?;
		let working = self.committed.read().await.clone();

		debug!("Opened memory store transaction");
		Ok(Box::new(MemoryTransaction {
			committed: self.committed.clone(),
			working,
			failing: self.failing.clone(),
			failing_inserts: self.failing_inserts.clone(),
			writes: 0,
			_guard: guard,
		}))
	}
}

struct MemoryTransaction {
	committed: Arc<RwLock<Tables>>,
	working: Tables,
	failing: HashSet<Category>,
	failing_inserts: HashSet<Category>,
	writes: usize,
	_guard: OwnedMutexGuard<()>,
}

impl MemoryTransaction {
	fn check(&self, category: Category) -> Result<(), StoreError> {
		if self.failing.contains(&category) {
			return Err(StoreError::WriteFailed {
				category,
				reason: "write rejected by store".to_string(),
			});
		}
		Ok(())
	}

	fn check_insert(&self, category: Category) -> Result<(), StoreError> {
		self.check(category)?;
		if self.failing_inserts.contains(&category) {
			return Err(StoreError::WriteFailed {
				category,
				reason: "insert rejected by store".to_string(),
			});
		}
		Ok(())
	}
}

#[async_trait::async_trait]
impl StoreTransaction for MemoryTransaction {
	async fn delete_all(&mut self, category: Category) -> Result<(), StoreError> {
		self.check(category)?;
		self.working.clear(category);
		self.writes += 1;
		Ok(())
	}

	async fn delete_module(
		&mut self,
		category: Category,
		module_code: &str,
	) -> Result<(), StoreError> {
		self.check(category)?;
		if !category.is_module_scoped() {
			return Err(StoreError::WriteFailed {
				category,
				reason: "category is not module-scoped".to_string(),
			});
		}
		self.working.clear_module(category, module_code);
		self.writes += 1;
		Ok(())
	}

	async fn delete_unlinked_taxonomy(&mut self) -> Result<(), StoreError> {
		self.check(Category::Taxonomy)?;
		self.working.clear_unlinked_taxonomy();
		self.writes += 1;
		Ok(())
	}

	async fn insert(&mut self, rows: Rows) -> Result<(), StoreError> {
		self.check_insert(rows.category())?;
		self.working.write(rows, Conflict::Replace);
		self.writes += 1;
		Ok(())
	}

	async fn insert_or_ignore(&mut self, rows: Rows) -> Result<(), StoreError> {
		self.check_insert(rows.category())?;
		self.working.write(rows, Conflict::Ignore);
		self.writes += 1;
		Ok(())
	}

	async fn commit(self: Box<Self>) -> Result<(), StoreError> {
		let this = *self;
		*this.committed.write().await = this.working;
		info!("Committed memory store transaction ({} writes)", this.writes);
		Ok(())
	}

	async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
		info!(
			"Rolled back memory store transaction ({} writes discarded)",
			self.writes
		);
		Ok(())
	}
}
