use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use super::{Stage, StageKind, missing_credential, upstream};
use crate::error::StageError;
use crate::providers::{GenerationProvider, GenerationRequest, Part};
use crate::state::{PipelineState, Source};

pub const DOCUMENT_SOURCE_TITLE: &str = "Uploaded Document";
pub const DOCUMENT_SOURCE_URI: &str = "#local-file";

const ANALYSIS_INSTRUCTION: &str = "Generate a comprehensive analysis report. Structure: Executive Summary, Key Findings, Risks, Conclusion.";
const ANALYSIS_TEMPERATURE: f32 = 0.7;
const ANALYSIS_MAX_TOKENS: u32 = 8192;

/// Produces a structured report from an uploaded document.
pub struct DocumentAnalyzer {
    generation: Arc<dyn GenerationProvider>,
}

impl DocumentAnalyzer {
    pub fn new(generation: Arc<dyn GenerationProvider>) -> Self {
        Self { generation }
    }
}

#[async_trait]
impl Stage for DocumentAnalyzer {
    fn kind(&self) -> StageKind {
        StageKind::DocumentAnalyzer
    }

    #[instrument(name = "stage.document_analyzer", skip_all)]
    async fn run(&self, state: &mut PipelineState) -> Result<(), StageError> {
        if !self.generation.is_configured() {
            return Err(missing_credential(self.generation.credential_name()));
        }

        // Unlike an empty question, an empty document is fatal.
        let (content, mime_type) = match state.document_payload() {
            Some((content, mime_type)) if !content.is_empty() => (content, mime_type),
            _ => return Err(StageError::validation("No document content provided")),
        };

        info!(%mime_type, bytes = content.len(), "analyzing document");

        let request = GenerationRequest {
            parts: vec![
                Part::InlineData {
                    mime_type: mime_type.to_string(),
                    data: content.to_string(),
                },
                Part::Text(ANALYSIS_INSTRUCTION.to_string()),
            ],
            temperature: ANALYSIS_TEMPERATURE,
            max_output_tokens: ANALYSIS_MAX_TOKENS,
        };

        let report = self
            .generation
            .generate(&request)
            .await
            .map_err(|err| upstream("Document analysis", err))?;

        state.report = Some(report);
        state.sources = vec![Source::new(DOCUMENT_SOURCE_TITLE, DOCUMENT_SOURCE_URI)];
        state.images = Vec::new();
        Ok(())
    }
}
