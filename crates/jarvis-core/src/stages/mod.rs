//! The closed set of pipeline stages.

mod document;
mod image_extractor;
mod question;
mod report;
mod researcher;
mod source_dedup;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::StageError;
use crate::providers::{
    GeminiClient, GenerationProvider, ProviderError, SearchProvider, TavilyClient,
};
use crate::security::redact_secrets;
use crate::state::PipelineState;

pub use document::{DOCUMENT_SOURCE_TITLE, DOCUMENT_SOURCE_URI, DocumentAnalyzer};
pub use image_extractor::ImageExtractor;
pub use question::{NO_QUESTION_ANSWER, QuestionAnswerer};
pub use report::ReportGenerator;
pub use researcher::Researcher;
pub use source_dedup::{SourceDeduplicator, dedup_sources};

/// Stable identifier of each stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Researcher,
    ImageExtractor,
    SourceDeduplicator,
    ReportGenerator,
    QuestionAnswerer,
    DocumentAnalyzer,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Researcher => "researcher",
            StageKind::ImageExtractor => "image_extractor",
            StageKind::SourceDeduplicator => "source_deduplicator",
            StageKind::ReportGenerator => "report_generator",
            StageKind::QuestionAnswerer => "question_answerer",
            StageKind::DocumentAnalyzer => "document_analyzer",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of pipeline work reading and writing the shared state.
#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    async fn run(&self, state: &mut PipelineState) -> Result<(), StageError>;
}

/// One instance of every stage, wired to the same provider clients.
#[derive(Clone)]
pub struct Stages {
    pub researcher: Arc<Researcher>,
    pub image_extractor: Arc<ImageExtractor>,
    pub source_deduplicator: Arc<SourceDeduplicator>,
    pub report_generator: Arc<ReportGenerator>,
    pub question_answerer: Arc<QuestionAnswerer>,
    pub document_analyzer: Arc<DocumentAnalyzer>,
}

impl Stages {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        generation: Arc<dyn GenerationProvider>,
        max_results: u8,
        search_depth: impl Into<String>,
    ) -> Self {
        Self {
            researcher: Arc::new(Researcher::new(search, max_results, search_depth)),
            image_extractor: Arc::new(ImageExtractor),
            source_deduplicator: Arc::new(SourceDeduplicator),
            report_generator: Arc::new(ReportGenerator::new(generation.clone())),
            question_answerer: Arc::new(QuestionAnswerer::new(generation.clone())),
            document_analyzer: Arc::new(DocumentAnalyzer::new(generation)),
        }
    }

    /// Build the HTTP-backed stages from configuration. Credentials are read
    /// once here; a missing one only fails the stages that need it.
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let search = TavilyClient::new(&config.search, config.search_api_key())?;
        let generation = GeminiClient::new(&config.generation, config.generation_api_key())?;
        Ok(Self::new(
            Arc::new(search),
            Arc::new(generation),
            config.search.max_results,
            config.search.search_depth.clone(),
        ))
    }

    pub fn get(&self, kind: StageKind) -> &dyn Stage {
        match kind {
            StageKind::Researcher => self.researcher.as_ref() as &dyn Stage,
            StageKind::ImageExtractor => self.image_extractor.as_ref(),
            StageKind::SourceDeduplicator => self.source_deduplicator.as_ref(),
            StageKind::ReportGenerator => self.report_generator.as_ref(),
            StageKind::QuestionAnswerer => self.question_answerer.as_ref(),
            StageKind::DocumentAnalyzer => self.document_analyzer.as_ref(),
        }
    }

    pub fn search_configured(&self) -> bool {
        self.researcher.is_configured()
    }

    pub fn generation_configured(&self) -> bool {
        self.report_generator.is_configured()
    }
}

fn missing_credential(name: &str) -> StageError {
    StageError::config(format!("{name} not configured"))
}

fn upstream(action: &str, error: ProviderError) -> StageError {
    match error {
        ProviderError::MissingCredential(name) => missing_credential(&name),
        other => StageError::upstream(redact_secrets(&format!("{action} failed: {other}"))),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::providers::{
        GenerationProvider, GenerationRequest, ProviderError, SearchProvider, SearchQuery,
        SearchResponse,
    };

    pub struct FakeSearch {
        pub configured: bool,
        pub response: Result<SearchResponse, u16>,
        pub calls: AtomicUsize,
        pub queries: Mutex<Vec<SearchQuery>>,
    }

    impl FakeSearch {
        pub fn returning(response: SearchResponse) -> Self {
            Self {
                configured: true,
                response: Ok(response),
                calls: AtomicUsize::new(0),
                queries: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(status: u16) -> Self {
            Self {
                response: Err(status),
                ..Self::returning(SearchResponse::default())
            }
        }

        pub fn unconfigured() -> Self {
            Self {
                configured: false,
                ..Self::returning(SearchResponse::default())
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SearchProvider for FakeSearch {
        fn credential_name(&self) -> &str {
            "TAVILY_API_KEY"
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.clone());
            match &self.response {
                Ok(response) => Ok(response.clone()),
                Err(status) => Err(ProviderError::Status {
                    status: *status,
                    body: "search unavailable".into(),
                }),
            }
        }
    }

    pub struct FakeGeneration {
        pub configured: bool,
        pub response: Result<String, u16>,
        pub calls: AtomicUsize,
        pub requests: Mutex<Vec<GenerationRequest>>,
    }

    impl FakeGeneration {
        pub fn returning(text: &str) -> Self {
            Self {
                configured: true,
                response: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(status: u16) -> Self {
            Self {
                response: Err(status),
                ..Self::returning("")
            }
        }

        pub fn unconfigured() -> Self {
            Self {
                configured: false,
                ..Self::returning("")
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn last_request(&self) -> GenerationRequest {
            self.requests
                .lock()
                .unwrap()
                .last()
                .cloned()
                .expect("no generation request recorded")
        }
    }

    #[async_trait]
    impl GenerationProvider for FakeGeneration {
        fn credential_name(&self) -> &str {
            "GOOGLE_API_KEY"
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            match &self.response {
                Ok(text) => Ok(text.clone()),
                Err(status) => Err(ProviderError::Status {
                    status: *status,
                    body: "generation unavailable".into(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_errors_are_redacted() {
        let err = upstream(
            "Search",
            ProviderError::Status {
                status: 401,
                body: r#"{"detail": "invalid api_key=tvly-secret"}"#.into(),
            },
        );
        let StageError::Upstream(message) = err else {
            panic!("expected upstream error");
        };
        assert!(message.starts_with("Search failed: provider returned HTTP 401"));
        assert!(!message.contains("tvly-secret"));
    }

    #[test]
    fn missing_credential_maps_to_config_error() {
        let err = upstream(
            "Search",
            ProviderError::MissingCredential("TAVILY_API_KEY".into()),
        );
        assert_eq!(err, StageError::config("TAVILY_API_KEY not configured"));
    }
}
