use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use super::{Stage, StageKind, missing_credential, upstream};
use crate::error::StageError;
use crate::providers::{GenerationProvider, GenerationRequest};
use crate::state::PipelineState;

const REPORT_TEMPERATURE: f32 = 0.7;
const DEEP_MAX_TOKENS: u32 = 8192;
const QUICK_MAX_TOKENS: u32 = 4096;

/// Turns the research context into a markdown report.
pub struct ReportGenerator {
    generation: Arc<dyn GenerationProvider>,
}

impl ReportGenerator {
    pub fn new(generation: Arc<dyn GenerationProvider>) -> Self {
        Self { generation }
    }

    pub fn is_configured(&self) -> bool {
        self.generation.is_configured()
    }
}

fn deep_prompt(topic: &str, context: &str) -> String {
    format!(
        r#"You are a research analyst tasked with creating a comprehensive report on "{topic}".

Use the following context information to create a detailed report with:
1. An executive summary
2. Background and scope
3. Detailed analysis sections
4. Key findings
5. Conclusions and recommendations

Context Information:
{context}

Provide a well-structured markdown report with appropriate headings and sections."#
    )
}

fn quick_prompt(topic: &str, context: &str) -> String {
    format!(
        r#"You are a research analyst tasked with creating a brief overview report on "{topic}".

Use the following context information to create a concise report with:
1. A brief summary
2. Key points
3. Main insights

Context Information:
{context}

Provide a well-structured markdown report with appropriate headings and sections."#
    )
}

pub(crate) fn report_request(topic: &str, context: &str, is_deep: bool) -> GenerationRequest {
    if is_deep {
        GenerationRequest::text(deep_prompt(topic, context), REPORT_TEMPERATURE, DEEP_MAX_TOKENS)
    } else {
        GenerationRequest::text(
            quick_prompt(topic, context),
            REPORT_TEMPERATURE,
            QUICK_MAX_TOKENS,
        )
    }
}

#[async_trait]
impl Stage for ReportGenerator {
    fn kind(&self) -> StageKind {
        StageKind::ReportGenerator
    }

    #[instrument(name = "stage.report_generator", skip_all, fields(topic = %state.topic(), deep = state.is_deep()))]
    async fn run(&self, state: &mut PipelineState) -> Result<(), StageError> {
        if !self.generation.is_configured() {
            return Err(missing_credential(self.generation.credential_name()));
        }

        let request = report_request(state.topic(), &state.context, state.is_deep());
        let report = self
            .generation
            .generate(&request)
            .await
            .map_err(|err| upstream("Report generation", err))?;

        info!(chars = report.len(), "report generated");
        state.report = Some(report);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Part;
    use crate::stages::test_support::FakeGeneration;

    fn prompt_of(request: &GenerationRequest) -> &str {
        match &request.parts[0] {
            Part::Text(text) => text,
            other => panic!("unexpected part {other:?}"),
        }
    }

    #[test]
    fn depth_selects_template_and_budget() {
        let deep = report_request("ai", "ctx", true);
        assert_eq!(deep.max_output_tokens, 8192);
        assert!(prompt_of(&deep).contains("comprehensive report on \"ai\""));
        assert!(prompt_of(&deep).contains("5. Conclusions and recommendations"));

        let quick = report_request("ai", "ctx", false);
        assert_eq!(quick.max_output_tokens, 4096);
        assert!(prompt_of(&quick).contains("brief overview report"));
        assert!(prompt_of(&quick).contains("3. Main insights"));
        assert!(!prompt_of(&quick).contains("4."));
        assert!(prompt_of(&quick).contains("ctx"));
    }

    #[tokio::test]
    async fn writes_generated_text_verbatim() {
        let generation = Arc::new(FakeGeneration::returning("# Report\n\nbody"));
        let stage = ReportGenerator::new(generation.clone());
        let mut state = PipelineState::research("ai", false);
        state.context = "\n\nTitle: A\nContent: B\n".into();

        stage.run(&mut state).await.unwrap();

        assert_eq!(state.report.as_deref(), Some("# Report\n\nbody"));
        let request = generation.last_request();
        assert!(prompt_of(&request).contains("Title: A"));
        assert!((request.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn missing_credential_is_config_error() {
        let generation = Arc::new(FakeGeneration::unconfigured());
        let stage = ReportGenerator::new(generation.clone());
        let mut state = PipelineState::research("ai", true);

        let err = stage.run(&mut state).await.unwrap_err();

        assert!(matches!(err, StageError::Config(_)));
        assert_eq!(generation.calls(), 0);
        assert!(state.report.is_none());
    }

    #[tokio::test]
    async fn provider_failure_is_upstream_error() {
        let generation = Arc::new(FakeGeneration::failing(500));
        let stage = ReportGenerator::new(generation);
        let mut state = PipelineState::research("ai", false);

        let err = stage.run(&mut state).await.unwrap_err();
        assert!(matches!(err, StageError::Upstream(ref msg) if msg.starts_with("Report generation failed")));
    }
}
