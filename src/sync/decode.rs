//! Schema-validated decoding of loosely-typed payloads.
//!
//! Every decoder returns a [`Decoded`] value: either the rows it could build, or
//! [`Decoded::Malformed`] when the payload does not have the expected top-level shape. A malformed
//! payload is never fatal; the stage that fetched it treats it as "nothing to update". Individual
//! entries that fail validation inside a well-formed payload are logged and skipped.

use crate::gateway::GatewayError;
use crate::model::{
	ANY, AdditionalField, AdditionalFieldDataset, AdditionalFieldValue, Dataset, Taxonomy,
};
use crate::sync::errors::SyncError;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

/// Outcome of decoding one payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
	Ok(T),
	Malformed(String),
}

impl<T: Default> Decoded<T> {
	/// The decoded rows, or the empty value for a malformed payload.
	pub fn into_rows(self) -> T {
		match self {
			Decoded::Ok(rows) => rows,
			Decoded::Malformed(_) => T::default(),
		}
	}

	/// Like [`into_rows`](Self::into_rows), logging why a malformed payload was ignored.
	pub fn rows_or_warn(self, what: impl std::fmt::Display) -> T {
		if let Decoded::Malformed(reason) = &self {
			warn!("Ignoring malformed {} payload: {}", what, reason);
		}
		self.into_rows()
	}
}

impl<T> Decoded<T> {
	pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Decoded<U> {
		match self {
			Decoded::Ok(rows) => Decoded::Ok(f(rows)),
			Decoded::Malformed(reason) => Decoded::Malformed(reason),
		}
	}

	pub fn and_then<U>(self, f: impl FnOnce(T) -> Decoded<U>) -> Decoded<U> {
		match self {
			Decoded::Ok(rows) => f(rows),
			Decoded::Malformed(reason) => Decoded::Malformed(reason),
		}
	}

	pub fn is_malformed(&self) -> bool {
		matches!(self, Decoded::Malformed(_))
	}
}

/// Turn the result of a typed gateway call into a decoded payload.
///
/// A [`GatewayError::Decode`] becomes [`Decoded::Malformed`]; every other error is fatal.
pub fn tolerate_malformed<T>(result: Result<T, GatewayError>) -> Result<Decoded<T>, SyncError> {
	match result {
		Ok(rows) => Ok(Decoded::Ok(rows)),
		Err(GatewayError::Decode(reason)) => Ok(Decoded::Malformed(reason)),
		Err(e) => Err(e.into()),
	}
}

/// Parse an RFC 3339 timestamp or a naive `YYYY-MM-DD HH:MM:SS[.f]` one taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
	if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
		return Some(timestamp.with_timezone(&Utc));
	}

	["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
		.iter()
		.find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
		.map(|naive| naive.and_utc())
}

/// Entries of a list payload: either a bare array or `{ "data": [...] }`.
fn list_entries(payload: &Value) -> Option<&Vec<Value>> {
	match payload {
		Value::Array(entries) => Some(entries),
		Value::Object(object) => object.get("data").and_then(Value::as_array),
		_ => None,
	}
}

fn decode_entries<T: DeserializeOwned>(entries: &[Value], what: &str) -> Vec<T> {
	entries
		.iter()
		.filter_map(|entry| match T::deserialize(entry) {
			Ok(record) => Some(record),
			Err(e) => {
				warn!("Skipping invalid {} entry: {}", what, e);
				None
			}
		})
		.collect()
}

#[derive(Debug, Deserialize)]
struct ModuleRef {
	module_code: String,
}

fn applies_to_module(modules: &Option<Vec<ModuleRef>>, module_code: &str) -> bool {
	match modules {
		Some(modules) => modules
			.iter()
			.any(|module| module.module_code.eq_ignore_ascii_case(module_code)),
		None => true,
	}
}

fn default_true() -> bool {
	true
}

#[derive(Debug, Deserialize)]
struct DatasetRecord {
	id_dataset: i64,
	dataset_name: String,
	#[serde(default)]
	dataset_desc: Option<String>,
	#[serde(default = "default_true")]
	active: bool,
	#[serde(default)]
	meta_create_date: Option<String>,
	#[serde(default)]
	modules: Option<Vec<ModuleRef>>,
}

/// Decode the datasets payload, keeping the datasets of `module_code`.
pub fn decode_datasets(payload: &Value, module_code: &str) -> Decoded<Vec<Dataset>> {
	let Some(entries) = list_entries(payload) else {
		return Decoded::Malformed("expected a list of datasets".to_string());
	};

	let datasets = decode_entries::<DatasetRecord>(entries, "dataset")
		.into_iter()
		.filter(|record| applies_to_module(&record.modules, module_code))
		.map(|record| Dataset {
			id: record.id_dataset,
			module_code: module_code.to_string(),
			name: record.dataset_name,
			description: record.dataset_desc.filter(|d| !d.is_empty()),
			active: record.active,
			created_at: record.meta_create_date.as_deref().and_then(parse_timestamp),
		})
		.collect();

	Decoded::Ok(datasets)
}

/// Decode the `kingdom -> [group]` taxonomy payload.
///
/// Each kingdom contributes a `(kingdom, ANY)` row followed by one row per group.
pub fn decode_taxonomy_ranks(payload: &Value) -> Decoded<Vec<Taxonomy>> {
	let Some(kingdoms) = payload.as_object() else {
		return Decoded::Malformed("expected an object of kingdoms".to_string());
	};

	let mut seen = HashSet::new();
	let mut ranks = Vec::new();

	for (kingdom, groups) in kingdoms {
		if kingdom.trim().is_empty() {
			continue;
		}
		let Some(groups) = groups.as_array() else {
			warn!("Skipping kingdom {} without a group list", kingdom);
			continue;
		};

		let rows = std::iter::once(ANY)
			.chain(groups.iter().filter_map(Value::as_str))
			.filter(|group| !group.trim().is_empty())
			.map(|group| Taxonomy::new(kingdom.as_str(), group));

		for row in rows {
			if seen.insert(row.clone()) {
				ranks.push(row);
			}
		}
	}

	Decoded::Ok(ranks)
}

/// Decode the `mnemonic -> nomenclature id` default values payload.
pub fn decode_default_nomenclatures(payload: &Value) -> Decoded<Vec<(String, i64)>> {
	let Some(defaults) = payload.as_object() else {
		return Decoded::Malformed("expected an object of default nomenclatures".to_string());
	};

	let entries = defaults
		.iter()
		.filter_map(|(mnemonic, id)| match id.as_i64() {
			Some(id) => Some((mnemonic.clone(), id)),
			None => {
				warn!(
					"Skipping default nomenclature {} with non-numeric value {}",
					mnemonic, id
				);
				None
			}
		})
		.collect();

	Decoded::Ok(entries)
}

/// Additional fields and their dependent rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdditionalFieldRows {
	pub fields: Vec<AdditionalField>,
	pub values: Vec<AdditionalFieldValue>,
	pub datasets: Vec<AdditionalFieldDataset>,
}

#[derive(Debug, Deserialize)]
struct DatasetRef {
	id_dataset: i64,
}

#[derive(Debug, Deserialize)]
struct ObjectRef {
	code_object: String,
}

#[derive(Debug, Deserialize)]
struct FieldRecord {
	id_field: i64,
	field_name: String,
	#[serde(default)]
	field_label: Option<String>,
	#[serde(default)]
	type_widget: Option<Value>,
	#[serde(default)]
	code_nomenclature_type: Option<String>,
	#[serde(default)]
	default_value: Option<Value>,
	#[serde(default)]
	field_values: Option<Vec<Value>>,
	#[serde(default)]
	datasets: Vec<DatasetRef>,
	#[serde(default)]
	modules: Option<Vec<ModuleRef>>,
	#[serde(default)]
	objects: Vec<ObjectRef>,
}

fn scalar_to_string(value: &Value) -> Option<String> {
	match value {
		Value::String(s) if !s.is_empty() => Some(s.clone()),
		Value::Number(n) => Some(n.to_string()),
		Value::Bool(b) => Some(b.to_string()),
		_ => None,
	}
}

fn widget_type(widget: &Option<Value>) -> String {
	widget
		.as_ref()
		.and_then(|widget| match widget {
			Value::Object(object) => object.get("widget_name").and_then(scalar_to_string),
			other => scalar_to_string(other),
		})
		.unwrap_or_else(|| "text".to_string())
}

fn field_value(field_id: i64, value: &Value) -> Option<AdditionalFieldValue> {
	match value {
		Value::Object(object) => {
			let value = object.get("value").and_then(scalar_to_string)?;
			let label = object.get("label").and_then(scalar_to_string);
			Some(AdditionalFieldValue {
				field_id,
				value,
				label,
			})
		}
		other => scalar_to_string(other).map(|value| AdditionalFieldValue {
			field_id,
			value,
			label: None,
		}),
	}
}

/// Decode the additional fields payload, keeping the fields of `module_code`.
pub fn decode_additional_fields(payload: &Value, module_code: &str) -> Decoded<AdditionalFieldRows> {
	let Some(entries) = list_entries(payload) else {
		return Decoded::Malformed("expected a list of additional fields".to_string());
	};

	let mut rows = AdditionalFieldRows::default();

	for record in decode_entries::<FieldRecord>(entries, "additional field") {
		if !applies_to_module(&record.modules, module_code) {
			continue;
		}

		let field_id = record.id_field;
		rows.values.extend(
			record
				.field_values
				.iter()
				.flatten()
				.filter_map(|value| field_value(field_id, value)),
		);
		rows.datasets
			.extend(record.datasets.iter().map(|dataset| AdditionalFieldDataset {
				field_id,
				dataset_id: dataset.id_dataset,
			}));
		rows.fields.push(AdditionalField {
			id: field_id,
			module_code: module_code.to_string(),
			name: record.field_name,
			label: record.field_label,
			widget_type: widget_type(&record.type_widget),
			nomenclature_type_mnemonic: record.code_nomenclature_type,
			default_value: record.default_value.as_ref().and_then(scalar_to_string),
			object_codes: record.objects.into_iter().map(|o| o.code_object).collect(),
		});
	}

	Decoded::Ok(rows)
}
