//!
//! HTTP client for the GeoNature and TaxHub reference data APIs.
//!
//! The client is built from an explicit [`GatewayConfig`]: base URLs and the session cookie are
//! plain values handed over at construction, so several clients pointing at different servers can
//! coexist. All methods are async and designed for use with Tokio.

use super::types::*;

use reqwest::header::{ACCEPT, COOKIE};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Connection settings of an [`HttpGateway`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
	/// Base URLs, `None` until the application has been configured.
	pub urls: Option<ServerUrls>,
	/// Session cookie issued by the authentication manager.
	pub session_cookie: Option<String>,
	/// Timeout applied to every request.
	pub timeout: Duration,
}

impl GatewayConfig {
	pub fn new(urls: ServerUrls) -> Self {
		Self {
			urls: Some(urls),
			session_cookie: None,
			timeout: Duration::from_secs(30),
		}
	}

	/// Configuration without base URLs: every call fails with a configuration error.
	pub fn unconfigured() -> Self {
		Self {
			urls: None,
			session_cookie: None,
			timeout: Duration::from_secs(30),
		}
	}

	pub fn with_session_cookie(mut self, cookie: impl Into<String>) -> Self {
		self.session_cookie = Some(cookie.into());
		self
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}
}

/// Reference data gateway over HTTP
#[derive(Clone)]
pub struct HttpGateway {
	/// The underlying HTTP client.
	http_client: Client,
	urls: Option<ServerUrls>,
	session_cookie: Option<String>,
}

impl HttpGateway {
	/// Create a new gateway.
	///
	/// # Errors
	/// Returns `GatewayError::Configuration` if the HTTP client cannot be built.
	pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
		let http_client = Client::builder()
			.timeout(config.timeout)
			.build()
			.map_err(|e| {
				GatewayError::Configuration(format!("Failed to create HTTP client: {}", e))
			})?;

		Ok(Self {
			http_client,
			urls: config.urls,
			session_cookie: config.session_cookie,
		})
	}

	fn urls(&self) -> Result<&ServerUrls, GatewayError> {
		self.urls
			.as_ref()
			.ok_or_else(|| GatewayError::Configuration("No server URLs configured".to_string()))
	}

	/// Perform a GET request and return the raw body of a successful response.
	async fn fetch(&self, url: Url) -> Result<Vec<u8>, GatewayError> {
		debug!("GET {}", url);

		let mut request = self
			.http_client
			.get(url)
			.header(ACCEPT, "application/json");
		if let Some(cookie) = &self.session_cookie {
			request = request.header(COOKIE, cookie.as_str());
		}

		let response = request.send().await?;
		let status = response.status();
		if !status.is_success() {
			debug!("Request failed with HTTP {}", status);
			return Err(GatewayError::from_status(status.as_u16()));
		}

		Ok(response.bytes().await?.to_vec())
	}

	async fn get_typed<T: DeserializeOwned>(&self, url: Url) -> Result<T, GatewayError> {
		let body = self.fetch(url).await?;
		Ok(serde_json::from_slice(&body)?)
	}
}

/// Append `path` to the base URL, keeping the base path intact.
fn endpoint(base: &Url, path: &str, query: &[(&str, String)]) -> Result<Url, GatewayError> {
	let mut url = base.clone();
	url.path_segments_mut()
		.map_err(|_| GatewayError::Configuration(format!("Invalid base URL: {}", base)))?
		.pop_if_empty()
		.extend(path.split('/'));

	if !query.is_empty() {
		let mut pairs = url.query_pairs_mut();
		for (key, value) in query {
			pairs.append_pair(key, value);
		}
	}

	Ok(url)
}

#[async_trait::async_trait]
impl RemoteDataGateway for HttpGateway {
	fn base_urls(&self) -> Result<ServerUrls, GatewayError> {
		self.urls().cloned()
	}

	async fn check_settings(&self) -> bool {
		self.urls.is_some()
	}

	async fn get_meta_datasets(&self, module_code: &str) -> Result<Value, GatewayError> {
		let url = endpoint(
			&self.urls()?.geonature,
			"api/meta/datasets",
			&[
				("fields", "modules".to_string()),
				("module_code", module_code.to_string()),
			],
		)?;
		self.get_typed(url).await
	}

	async fn get_users(&self, menu_id: i64) -> Result<Vec<UserRecord>, GatewayError> {
		let url = endpoint(
			&self.urls()?.geonature,
			&format!("api/users/menu/{}", menu_id),
			&[],
		)?;
		self.get_typed(url).await
	}

	async fn get_taxonomy_ranks(&self) -> Result<Value, GatewayError> {
		let url = endpoint(&self.urls()?.taxhub, "api/taxref/regnewithgroupe2", &[])?;
		self.get_typed(url).await
	}

	async fn get_nomenclatures(&self) -> Result<Vec<NomenclatureTypeTree>, GatewayError> {
		let url = endpoint(
			&self.urls()?.geonature,
			"api/nomenclatures/nomenclatures/taxonomy",
			&[],
		)?;
		self.get_typed(url).await
	}

	async fn get_default_nomenclatures_values(
		&self,
		module_code: &str,
	) -> Result<Value, GatewayError> {
		let url = endpoint(
			&self.urls()?.geonature,
			&format!("api/{}/defaultNomenclatures", module_code.to_lowercase()),
			&[],
		)?;
		self.get_typed(url).await
	}

	async fn get_taxa(
		&self,
		list_id: i64,
		limit: usize,
		offset: usize,
	) -> Result<Vec<TaxonRecord>, GatewayError> {
		let url = endpoint(
			&self.urls()?.taxhub,
			&format!("api/taxref/allnamebylist/{}", list_id),
			&[("limit", limit.to_string()), ("offset", offset.to_string())],
		)?;
		self.get_typed(url).await
	}

	async fn get_taxa_areas(
		&self,
		code_area_type: Option<&str>,
		limit: usize,
		offset: usize,
	) -> Result<Vec<TaxonAreaRecord>, GatewayError> {
		let mut query = Vec::new();
		if let Some(code) = code_area_type {
			query.push(("code_area_type", code.to_string()));
		}
		query.push(("limit", limit.to_string()));
		query.push(("offset", offset.to_string()));

		let url = endpoint(&self.urls()?.geonature, "api/synthese/color_taxon", &query)?;
		self.get_typed(url).await
	}

	async fn get_additional_fields(&self, module_code: &str) -> Result<Value, GatewayError> {
		let url = endpoint(
			&self.urls()?.geonature,
			"api/gn_commons/additional_fields",
			&[("module_code", module_code.to_string())],
		)?;
		self.get_typed(url).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn endpoint_keeps_base_path() {
		let base = Url::parse("https://demo.geonature.fr/geonature").unwrap();
		let url = endpoint(&base, "api/users/menu/1", &[]).unwrap();
		assert_eq!(url.as_str(), "https://demo.geonature.fr/geonature/api/users/menu/1");

		let base = Url::parse("https://demo.geonature.fr/taxhub/").unwrap();
		let url = endpoint(
			&base,
			"api/taxref/allnamebylist/100",
			&[("limit", "50".to_string()), ("offset", "100".to_string())],
		)
		.unwrap();
		assert_eq!(
			url.as_str(),
			"https://demo.geonature.fr/taxhub/api/taxref/allnamebylist/100?limit=50&offset=100"
		);
	}

	#[tokio::test]
	async fn unconfigured_gateway() {
		let gateway = HttpGateway::new(GatewayConfig::unconfigured()).unwrap();
		assert!(!gateway.check_settings().await);
		assert!(matches!(gateway.base_urls(), Err(GatewayError::Configuration(_))));
		assert!(matches!(
			gateway.get_users(1).await,
			Err(GatewayError::Configuration(_))
		));
	}
}
