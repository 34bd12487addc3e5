use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, instrument};

use super::{ProviderError, SearchProvider, SearchQuery, SearchResponse, error_body};
use crate::SecretValue;
use crate::config::SearchConfig;

/// Search provider speaking the Tavily `/search` API.
pub struct TavilyClient {
    client: reqwest::Client,
    endpoint: String,
    credential_name: String,
    api_key: Option<SecretValue>,
}

#[derive(Serialize)]
struct SearchBody<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    include_answer: bool,
    include_images: bool,
    include_raw_content: bool,
    max_results: u8,
}

impl TavilyClient {
    pub fn new(config: &SearchConfig, api_key: Option<SecretValue>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            credential_name: config.api_key_env.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl SearchProvider for TavilyClient {
    fn credential_name(&self) -> &str {
        &self.credential_name
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(name = "provider.search", skip_all, fields(max_results = query.max_results))]
    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, ProviderError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ProviderError::MissingCredential(self.credential_name.clone()))?;

        let body = SearchBody {
            api_key: api_key.expose(),
            query: &query.query,
            search_depth: &query.depth,
            include_answer: true,
            include_images: query.include_images,
            include_raw_content: false,
            max_results: query.max_results,
        };

        let response = self
            .client
            .post(format!("{}/search", self.endpoint))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }

        let payload: SearchResponse = response.json().await?;
        debug!(
            results = payload.results.len(),
            images = payload.images.as_ref().map(Vec::len).unwrap_or(0),
            "search provider responded"
        );
        Ok(payload)
    }
}
