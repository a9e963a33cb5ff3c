//! Settings file of the synchronization binary.
//!
//! ```json
//! {
//!   "sync": {
//!     "geonature_url": "https://demo.geonature.fr/geonature",
//!     "taxhub_url": "https://demo.geonature.fr/taxhub",
//!     "module_code": "OCCTAX",
//!     "users_menu_id": 1,
//!     "taxa_list_id": 100
//!   },
//!   "session_cookie": "token=..."
//! }
//! ```

use crate::gateway::{GatewayConfig, ServerUrls};
use crate::sync::{DEFAULT_PAGE_SIZE, Params, SyncConfig};

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors raised while loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
	#[error("Failed to read settings file {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Invalid settings file: {0}")]
	Parse(#[from] serde_json::Error),

	#[error("Invalid {field} URL '{value}': {reason}")]
	InvalidUrl {
		field: &'static str,
		value: String,
		reason: String,
	},

	#[error("Invalid setting {0}")]
	Invalid(String),
}

fn default_page_size() -> usize {
	DEFAULT_PAGE_SIZE
}

fn default_true() -> bool {
	true
}

fn default_timeout() -> u64 {
	30
}

/// The `sync` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
	pub geonature_url: String,
	pub taxhub_url: String,
	pub module_code: String,
	pub users_menu_id: i64,
	pub taxa_list_id: i64,
	#[serde(default)]
	pub code_area_type: Option<String>,
	#[serde(default = "default_page_size")]
	pub page_size: usize,
	#[serde(default = "default_true")]
	pub with_additional_data: bool,
	#[serde(default)]
	pub with_additional_fields: bool,
	#[serde(default = "default_timeout")]
	pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
	pub sync: SyncSettings,
	#[serde(default)]
	pub session_cookie: Option<String>,
}

/// Parse a base URL, making sure it ends with a slash so paths are appended to it.
fn base_url(field: &'static str, value: &str) -> Result<Url, SettingsError> {
	let invalid = |reason: String| SettingsError::InvalidUrl {
		field,
		value: value.to_string(),
		reason,
	};

	let mut url = Url::parse(value.trim()).map_err(|e| invalid(e.to_string()))?;
	if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
		return Err(invalid("expected an http(s) URL".to_string()));
	}
	if !url.path().ends_with('/') {
		let path = format!("{}/", url.path());
		url.set_path(&path);
	}
	Ok(url)
}

impl Settings {
	/// Load and validate a settings file
	pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_json(&content)
	}

	pub fn from_json(content: &str) -> Result<Self, SettingsError> {
		let settings: Settings = serde_json::from_str(content)?;
		settings.validate()?;
		Ok(settings)
	}

	fn validate(&self) -> Result<(), SettingsError> {
		self.server_urls()?;
		if self.sync.module_code.trim().is_empty() {
			return Err(SettingsError::Invalid("module_code is empty".to_string()));
		}
		Ok(())
	}

	pub fn server_urls(&self) -> Result<ServerUrls, SettingsError> {
		Ok(ServerUrls {
			geonature: base_url("geonature", &self.sync.geonature_url)?,
			taxhub: base_url("taxhub", &self.sync.taxhub_url)?,
		})
	}

	pub fn gateway_config(&self) -> Result<GatewayConfig, SettingsError> {
		let mut config = GatewayConfig::new(self.server_urls()?)
			.with_timeout(Duration::from_secs(self.sync.request_timeout_secs));
		if let Some(cookie) = &self.session_cookie {
			config = config.with_session_cookie(cookie.clone());
		}
		Ok(config)
	}

	pub fn sync_config(&self) -> SyncConfig {
		SyncConfig::new(self.sync.module_code.trim(), self.sync.taxa_list_id)
	}

	pub fn params(&self) -> Params {
		let params = Params::new(self.sync.users_menu_id)
			.with_additional_data(self.sync.with_additional_data)
			.with_additional_fields(self.sync.with_additional_fields)
			.with_page_size(self.sync.page_size);
		match &self.sync.code_area_type {
			Some(code) => params.with_code_area_type(code.clone()),
			None => params,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;
	use tempfile::NamedTempFile;

	const MINIMAL: &str = r#"{
		"sync": {
			"geonature_url": "https://demo.geonature.fr/geonature",
			"taxhub_url": "https://demo.geonature.fr/taxhub/",
			"module_code": "OCCTAX",
			"users_menu_id": 1,
			"taxa_list_id": 100
		}
	}"#;

	#[test]
	fn loads_from_file_with_defaults() {
		let mut file = NamedTempFile::new().unwrap();
		file.write_all(MINIMAL.as_bytes()).unwrap();

		let settings = Settings::load(file.path()).unwrap();
		assert_eq!(settings.sync.page_size, DEFAULT_PAGE_SIZE);
		assert!(settings.sync.with_additional_data);
		assert!(!settings.sync.with_additional_fields);
		assert!(settings.session_cookie.is_none());

		let urls = settings.server_urls().unwrap();
		assert_eq!(urls.geonature.as_str(), "https://demo.geonature.fr/geonature/");
		assert_eq!(urls.taxhub.as_str(), "https://demo.geonature.fr/taxhub/");

		let params = settings.params();
		assert_eq!(params.users_menu_id, 1);
		assert!(params.code_area_type.is_none());
		assert_eq!(settings.sync_config().taxa_list_id, 100);
	}

	#[test]
	fn rejects_invalid_urls() {
		let content = MINIMAL.replace("https://demo.geonature.fr/geonature", "not a url");
		assert!(matches!(
			Settings::from_json(&content),
			Err(SettingsError::InvalidUrl {
				field: "geonature",
				..
			})
		));

		let content = MINIMAL.replace("https://demo.geonature.fr/taxhub/", "ftp://host/taxhub");
		assert!(matches!(
			Settings::from_json(&content),
			Err(SettingsError::InvalidUrl { field: "taxhub", .. })
		));
	}

	#[test]
	fn missing_file_and_fields() {
		let dir = tempfile::tempdir().unwrap();
		assert!(matches!(
			Settings::load(dir.path().join("missing.json")),
			Err(SettingsError::Io { .. })
		));
		assert!(matches!(
			Settings::from_json(r#"{ "sync": {} }"#),
			Err(SettingsError::Parse(_))
		));
	}

	#[test]
	fn gateway_config_carries_cookie() {
		let mut settings = Settings::from_json(MINIMAL).unwrap();
		settings.session_cookie = Some("token=abc".to_string());
		let config = settings.gateway_config().unwrap();
		assert_eq!(config.session_cookie.as_deref(), Some("token=abc"));
		assert!(config.urls.is_some());
	}
}
