use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use super::{Stage, StageKind, missing_credential, upstream};
use crate::error::StageError;
use crate::providers::{SearchProvider, SearchQuery, SearchResponse};
use crate::state::{PipelineState, Source};

const UNKNOWN_TITLE: &str = "Unknown";
const MISSING_URI: &str = "#";

/// Gathers web search results for the research topic.
pub struct Researcher {
    search: Arc<dyn SearchProvider>,
    max_results: u8,
    depth: String,
}

impl Researcher {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        max_results: u8,
        depth: impl Into<String>,
    ) -> Self {
        Self {
            search,
            max_results,
            depth: depth.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.search.is_configured()
    }

    fn query_for(topic: &str, is_deep: bool) -> String {
        if is_deep {
            format!("comprehensive information about {topic}")
        } else {
            format!("overview of {topic}")
        }
    }
}

fn build_context(response: &SearchResponse) -> String {
    response
        .results
        .iter()
        .map(|hit| {
            format!(
                "\n\nTitle: {}\nContent: {}\n",
                hit.title.as_deref().unwrap_or(UNKNOWN_TITLE),
                hit.content.as_deref().unwrap_or_default()
            )
        })
        .collect()
}

fn build_sources(response: &SearchResponse) -> Vec<Source> {
    response
        .results
        .iter()
        .map(|hit| {
            Source::new(
                hit.title.as_deref().unwrap_or(UNKNOWN_TITLE),
                hit.url.as_deref().unwrap_or(MISSING_URI),
            )
        })
        .collect()
}

#[async_trait]
impl Stage for Researcher {
    fn kind(&self) -> StageKind {
        StageKind::Researcher
    }

    #[instrument(name = "stage.researcher", skip_all, fields(topic = %state.topic(), deep = state.is_deep()))]
    async fn run(&self, state: &mut PipelineState) -> Result<(), StageError> {
        if !self.search.is_configured() {
            return Err(missing_credential(self.search.credential_name()));
        }

        let query = SearchQuery {
            query: Self::query_for(state.topic(), state.is_deep()),
            depth: self.depth.clone(),
            max_results: self.max_results,
            include_images: true,
        };

        let response = self
            .search
            .search(&query)
            .await
            .map_err(|err| upstream("Search", err))?;

        state.context = build_context(&response);
        state.sources = build_sources(&response);
        state.images = response.images.clone().unwrap_or_default();

        info!(
            sources = state.sources.len(),
            images = state.images.len(),
            "researcher collected search results"
        );

        state.search_results = Some(response);
        Ok(())
    }
}
