//! Contracts for the two external services the stages call, plus their HTTP
//! implementations.

mod gemini;
mod tavily;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use gemini::GeminiClient;
pub use tavily::TavilyClient;

/// Failure talking to an external provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider credential `{0}` is not configured")]
    MissingCredential(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected provider payload: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        // Never carry the request URL; some providers accept keys as query params.
        let error = error.without_url();
        if error.is_decode() {
            ProviderError::Decode(error.to_string())
        } else {
            ProviderError::Transport(error.to_string())
        }
    }
}

/// One search call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
    pub depth: String,
    pub max_results: u8,
    pub include_images: bool,
}

/// One result row as returned by the search provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

/// Search payload. `images` is `None` when the provider omitted the key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub results: Vec<SearchHit>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Environment variable (or other handle) the credential is read from.
    fn credential_name(&self) -> &str;

    fn is_configured(&self) -> bool;

    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, ProviderError>;
}

/// A fragment of the generation request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    /// Binary content, already base64-encoded, tagged with its MIME type.
    InlineData { mime_type: String, data: String },
}

/// One generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub parts: Vec<Part>,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl GenerationRequest {
    pub fn text(prompt: impl Into<String>, temperature: f32, max_output_tokens: u32) -> Self {
        Self {
            parts: vec![Part::Text(prompt.into())],
            temperature,
            max_output_tokens,
        }
    }

    pub fn with_part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn credential_name(&self) -> &str;

    fn is_configured(&self) -> bool;

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError>;
}

/// Read an error body for reporting, truncated so a full HTML error page does
/// not end up in logs.
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    const LIMIT: usize = 512;
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > LIMIT {
        let mut cut = LIMIT;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    body
}
