//! Catalog API client
//!
//! Every request goes through [`ModIoApi::execute_request`], which turns a
//! non-success status into a classified [`RequestError`]. Rate-limited
//! responses carry `X-RateLimit-RetryAfter` (seconds), which is converted to
//! an absolute reset time so a caller can wait it out.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::api::types::{ErrorEnvelope, Pagination, RequestFilter, RequestPage};
use crate::config::SyncConfig;
use crate::core::{server_time_now, Modfile, ModProfile, RequestError, Result, SyncError};

const RATE_LIMIT_RETRY_HEADER: &str = "X-RateLimit-RetryAfter";

/// Read access to the remote catalog
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Fetch a single modfile; the response carries a fresh download locator
    async fn get_modfile(&self, mod_id: i64, modfile_id: i64) -> Result<Modfile>;

    async fn get_mod(&self, mod_id: i64) -> Result<ModProfile>;

    async fn get_all_mods(
        &self,
        filter: &RequestFilter,
        pagination: Pagination,
    ) -> Result<RequestPage<ModProfile>>;

    /// Mods owned by the authenticated user
    async fn get_user_mods(
        &self,
        filter: &RequestFilter,
        pagination: Pagination,
    ) -> Result<RequestPage<ModProfile>>;
}

/// REST client for a mod.io-style catalog
#[derive(Debug, Clone)]
pub struct ModIoApi {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    oauth_token: Option<String>,
    game_id: i64,
}

impl ModIoApi {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| SyncError::Configuration {
                message: format!("failed to create HTTP client: {}", e),
                field: None,
            })?;

        // Validate once so endpoint construction only fails on bad paths
        Url::parse(&config.api_base_url).map_err(|source| SyncError::InvalidUrl {
            url: config.api_base_url.clone(),
            source,
        })?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            oauth_token: config.oauth_token.clone(),
            game_id: config.game_id,
        })
    }

    pub fn game_id(&self) -> i64 {
        self.game_id
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let raw = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        Url::parse(&raw).map_err(|source| SyncError::InvalidUrl { url: raw, source })
    }

    /// Create a request carrying whichever credentials are configured
    fn create_authenticated_request(&self, url: Url) -> RequestBuilder {
        let mut request = self.client.get(url).header("Accept", "application/json");
        if let Some(api_key) = &self.api_key {
            request = request.query(&[("api_key", api_key)]);
        }
        if let Some(token) = &self.oauth_token {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn execute_request(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await?;
        debug!("Catalog response: {} {}", response.status(), response.url());

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().to_string();
        let limited_until = response
            .headers()
            .get(RATE_LIMIT_RETRY_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map(|seconds| server_time_now() + seconds);

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|envelope| envelope.error.message)
            .ok()
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

        Err(RequestError::from_status(url, status.as_u16(), message, limited_until).into())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let context = url.path().to_string();
        let response = self
            .execute_request(self.create_authenticated_request(url))
            .await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|source| SyncError::Decode { context, source })
    }

    async fn get_page(
        &self,
        path: &str,
        filter: &RequestFilter,
        pagination: Pagination,
    ) -> Result<RequestPage<ModProfile>> {
        let mut url = self.endpoint(path)?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in filter.to_query().into_iter().chain(pagination.to_query()) {
                pairs.append_pair(&key, &value);
            }
        }
        self.get_json(url).await
    }
}

#[async_trait]
impl CatalogClient for ModIoApi {
    async fn get_modfile(&self, mod_id: i64, modfile_id: i64) -> Result<Modfile> {
        let url = self.endpoint(&format!(
            "games/{}/mods/{}/files/{}",
            self.game_id, mod_id, modfile_id
        ))?;
        self.get_json(url).await
    }

    async fn get_mod(&self, mod_id: i64) -> Result<ModProfile> {
        let url = self.endpoint(&format!("games/{}/mods/{}", self.game_id, mod_id))?;
        self.get_json(url).await
    }

    async fn get_all_mods(
        &self,
        filter: &RequestFilter,
        pagination: Pagination,
    ) -> Result<RequestPage<ModProfile>> {
        self.get_page(&format!("games/{}/mods", self.game_id), filter, pagination)
            .await
    }

    async fn get_user_mods(
        &self,
        filter: &RequestFilter,
        pagination: Pagination,
    ) -> Result<RequestPage<ModProfile>> {
        self.get_page("me/mods", filter, pagination).await
    }
}
