//! Nomenclature reconciliation.
//!
//! The remote service returns nomenclatures as a tree: types own values, and each value may be
//! scoped to some kingdoms and groups. The reconciler flattens that tree into the store's
//! categories and writes them in dependency order, since later rows reference ids of earlier ones:
//!
//! 1. nomenclature types
//! 2. nomenclature values (replacing them also clears the links and the module's defaults)
//! 3. taxonomy ranks referenced by value scopes (insert-or-ignore, never deleted)
//! 4. value/taxonomy links
//! 5. the module's default values, restricted to freshly fetched types and values

use crate::gateway::{NomenclatureTypeTree, TaxonomyScope};
use crate::model::{
	ANY, DefaultNomenclature, Nomenclature, NomenclatureTaxonomy, NomenclatureType, Taxonomy,
};
use crate::store::{Category, Rows};
use crate::sync::decode::{decode_default_nomenclatures, tolerate_malformed};
use crate::sync::errors::{AtStage, StageFailure};
use crate::sync::stages::{Stage, StageContext};
use crate::sync::status::{DataSyncStatus, SyncStage};

use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Flattened nomenclature rows of one remote snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NomenclatureSet {
	pub types: Vec<NomenclatureType>,
	pub values: Vec<Nomenclature>,
	pub links: Vec<NomenclatureTaxonomy>,
	/// Distinct taxonomy ranks referenced by `links`, in first-seen order.
	pub ranks: Vec<Taxonomy>,
}

impl NomenclatureSet {
	/// Flatten and filter the nomenclature tree.
	///
	/// Values with a non-positive id are dropped first; types with a non-positive id or without any
	/// remaining value are dropped next.
	pub fn from_trees(trees: Vec<NomenclatureTypeTree>) -> Self {
		let mut set = Self::default();
		let mut seen_ranks = HashSet::new();

		for tree in trees {
			let values: Vec<_> = tree.values.into_iter().filter(|v| v.id > 0).collect();
			if tree.id <= 0 || values.is_empty() {
				debug!("Dropping nomenclature type {} ({})", tree.mnemonic, tree.id);
				continue;
			}

			set.types.push(NomenclatureType {
				id: tree.id,
				mnemonic: tree.mnemonic,
				default_label: tree.label_default,
			});

			for value in values {
				let mut scopes = HashSet::new();
				for taxonomy in scope_pairs(value.id, &value.taxonomy) {
					if !scopes.insert(taxonomy.clone()) {
						continue;
					}
					if seen_ranks.insert(taxonomy.clone()) {
						set.ranks.push(taxonomy.clone());
					}
					set.links.push(NomenclatureTaxonomy {
						nomenclature_id: value.id,
						taxonomy,
					});
				}

				set.values.push(Nomenclature {
					id: value.id,
					code: value.code,
					hierarchy: value.hierarchy.unwrap_or_else(|| tree.id.to_string()),
					default_label: value.label_default,
					type_id: tree.id,
				});
			}
		}

		set
	}

	/// Keep the defaults whose mnemonic names a type of this set and whose id is a value of it.
	pub fn filter_defaults(
		&self,
		module_code: &str,
		defaults: Vec<(String, i64)>,
	) -> Vec<DefaultNomenclature> {
		let type_ids: HashMap<&str, i64> = self
			.types
			.iter()
			.map(|t| (t.mnemonic.as_str(), t.id))
			.collect();
		let values: HashSet<(i64, i64)> = self.values.iter().map(|v| (v.type_id, v.id)).collect();

		let mut kept = Vec::new();
		let mut seen = HashSet::new();
		for (mnemonic, id) in defaults {
			let Some(type_id) = type_ids.get(mnemonic.as_str()) else {
				warn!("Dropping default nomenclature for unknown type {}", mnemonic);
				continue;
			};
			if !values.contains(&(*type_id, id)) {
				warn!(
					"Dropping default nomenclature {} of type {}: not a value of that type",
					id, mnemonic
				);
				continue;
			}
			if seen.insert(id) {
				kept.push(DefaultNomenclature {
					module_code: module_code.to_string(),
					nomenclature_id: id,
				});
			}
		}

		kept
	}
}

/// Taxonomy pairs a value applies to; no scope means every kingdom and group.
fn scope_pairs(value_id: i64, scopes: &[TaxonomyScope]) -> Vec<Taxonomy> {
	if scopes.is_empty() {
		return vec![Taxonomy::wildcard()];
	}

	scopes
		.iter()
		.map(|scope| {
			let kingdom = non_blank(&scope.kingdom);
			let group = non_blank(&scope.group);
			if kingdom.is_none() && group.is_some() {
				warn!(
					"Nomenclature {} is scoped to group {:?} without a kingdom",
					value_id, scope.group
				);
			}
			Taxonomy::new(kingdom.unwrap_or(ANY), group.unwrap_or(ANY))
		})
		.collect()
}

fn non_blank(value: &Option<String>) -> Option<&str> {
	value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Stage reconciling nomenclature types, values, taxonomy links and module defaults.
pub struct NomenclatureReconciler;

impl NomenclatureReconciler {
	async fn persist(
		ctx: &mut StageContext<'_>,
		set: &NomenclatureSet,
	) -> Result<(), StageFailure> {
		let config = ctx.config;
		let stage = SyncStage::NomenclatureTypes;
		ctx.tx.delete_all(Category::NomenclatureTypes).await.at(stage)?;
		ctx.tx
			.insert(Rows::NomenclatureTypes(set.types.clone()))
			.await
			.at(stage)?;
		ctx.emit(DataSyncStatus::succeeded(stage, set.types.len()))
			.await;

		let stage = SyncStage::Nomenclatures;
		ctx.tx.delete_all(Category::Nomenclatures).await.at(stage)?;
		ctx.tx
			.delete_all(Category::NomenclatureTaxonomy)
			.await
			.at(stage)?;
		ctx.tx
			.delete_module(Category::DefaultNomenclatures, &config.module_code)
			.await
			.at(stage)?;
		ctx.tx
			.insert(Rows::Nomenclatures(set.values.clone()))
			.await
			.at(stage)?;
		ctx.emit(DataSyncStatus::succeeded(stage, set.values.len()))
			.await;

		let stage = SyncStage::NomenclatureTaxonomy;
		ctx.tx
			.insert_or_ignore(Rows::Taxonomy(set.ranks.clone()))
			.await
			.at(stage)?;
		ctx.tx
			.insert(Rows::NomenclatureTaxonomy(set.links.clone()))
			.await
			.at(stage)?;
		ctx.emit(DataSyncStatus::succeeded(stage, set.links.len()))
			.await;

		Ok(())
	}

	async fn sync_defaults(
		ctx: &mut StageContext<'_>,
		set: &NomenclatureSet,
	) -> Result<(), StageFailure> {
		let stage = SyncStage::DefaultNomenclatures;
		let config = ctx.config;
		ctx.emit(DataSyncStatus::running(stage, None)).await;

		let defaults = tolerate_malformed(
			ctx.gateway
				.get_default_nomenclatures_values(&config.module_code)
				.await,
		)
		.at(stage)?
		.and_then(|payload| decode_default_nomenclatures(&payload))
		.rows_or_warn(stage);

		let defaults = set.filter_defaults(&config.module_code, defaults);
		if !defaults.is_empty() {
			ctx.tx
				.insert(Rows::DefaultNomenclatures(defaults.clone()))
				.await
				.at(stage)?;
		}
		ctx.emit(DataSyncStatus::succeeded(stage, defaults.len()))
			.await;

		Ok(())
	}
}

#[async_trait::async_trait]
impl Stage for NomenclatureReconciler {
	fn stage(&self) -> SyncStage {
		SyncStage::NomenclatureTypes
	}

	async fn run(&self, ctx: &mut StageContext<'_>) -> Result<(), StageFailure> {
		let trees = tolerate_malformed(ctx.gateway.get_nomenclatures().await)
			.at(SyncStage::NomenclatureTypes)?
			.rows_or_warn(SyncStage::NomenclatureTypes);

		let set = NomenclatureSet::from_trees(trees);
		if set.types.is_empty() {
			ctx.emit(DataSyncStatus::succeeded(SyncStage::NomenclatureTypes, 0))
				.await;
			return Ok(());
		}

		info!(
			"Reconciling {} nomenclature types with {} values",
			set.types.len(),
			set.values.len()
		);

		Self::persist(ctx, &set).await?;
		ctx.check_cancelled(SyncStage::DefaultNomenclatures)?;
		Self::sync_defaults(ctx, &set).await
	}
}
