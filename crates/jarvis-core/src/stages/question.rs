use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use super::{Stage, StageKind, missing_credential, upstream};
use crate::error::StageError;
use crate::providers::{GenerationProvider, GenerationRequest};
use crate::state::PipelineState;

/// Answer stored when the question is empty; no provider call is made.
pub const NO_QUESTION_ANSWER: &str = "No question provided.";

const ANSWER_TEMPERATURE: f32 = 0.5;
const ANSWER_MAX_TOKENS: u32 = 2048;

/// Answers a question grounded on caller-supplied context.
pub struct QuestionAnswerer {
    generation: Arc<dyn GenerationProvider>,
}

impl QuestionAnswerer {
    pub fn new(generation: Arc<dyn GenerationProvider>) -> Self {
        Self { generation }
    }
}

fn answer_prompt(question: &str, context: &str) -> String {
    format!(
        r#"You are a helpful AI assistant. Answer the following question using the provided context information.

Question: {question}

Context Information:
{context}

Provide a clear and concise answer based on the context. If the context doesn't contain relevant information, say so."#
    )
}

#[async_trait]
impl Stage for QuestionAnswerer {
    fn kind(&self) -> StageKind {
        StageKind::QuestionAnswerer
    }

    #[instrument(name = "stage.question_answerer", skip_all)]
    async fn run(&self, state: &mut PipelineState) -> Result<(), StageError> {
        if !self.generation.is_configured() {
            return Err(missing_credential(self.generation.credential_name()));
        }

        let question = state.question_text();
        if question.is_empty() {
            warn!("no question provided; skipping generation");
            state.answer = Some(NO_QUESTION_ANSWER.to_string());
            return Ok(());
        }

        let request = GenerationRequest::text(
            answer_prompt(question, &state.context),
            ANSWER_TEMPERATURE,
            ANSWER_MAX_TOKENS,
        );
        let answer = self
            .generation
            .generate(&request)
            .await
            .map_err(|err| upstream("Question answering", err))?;

        info!(chars = answer.len(), "question answered");
        state.answer = Some(answer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Part;
    use crate::stages::test_support::FakeGeneration;

    #[tokio::test]
    async fn empty_question_short_circuits() {
        let generation = Arc::new(FakeGeneration::returning("unused"));
        let stage = QuestionAnswerer::new(generation.clone());
        let mut state = PipelineState::question("", "context");

        stage.run(&mut state).await.unwrap();

        assert_eq!(state.answer.as_deref(), Some(NO_QUESTION_ANSWER));
        assert_eq!(generation.calls(), 0);
    }

    #[tokio::test]
    async fn credential_is_checked_before_the_empty_question_shortcut() {
        let generation = Arc::new(FakeGeneration::unconfigured());
        let stage = QuestionAnswerer::new(generation);
        let mut state = PipelineState::question("", "");

        let err = stage.run(&mut state).await.unwrap_err();
        assert_eq!(err, StageError::config("GOOGLE_API_KEY not configured"));
        assert!(state.answer.is_none());
    }

    #[tokio::test]
    async fn answers_with_question_and_context_in_prompt() {
        let generation = Arc::new(FakeGeneration::returning("42"));
        let stage = QuestionAnswerer::new(generation.clone());
        let mut state = PipelineState::question("What is the answer?", "Deep Thought said 42.");

        stage.run(&mut state).await.unwrap();

        assert_eq!(state.answer.as_deref(), Some("42"));
        let request = generation.last_request();
        assert_eq!(request.max_output_tokens, 2048);
        let Part::Text(prompt) = &request.parts[0] else {
            panic!("expected text prompt");
        };
        assert!(prompt.contains("Question: What is the answer?"));
        assert!(prompt.contains("Deep Thought said 42."));
    }

    #[tokio::test]
    async fn provider_failure_is_upstream_error() {
        let generation = Arc::new(FakeGeneration::failing(429));
        let stage = QuestionAnswerer::new(generation);
        let mut state = PipelineState::question("why?", "");

        let err = stage.run(&mut state).await.unwrap_err();
        assert!(matches!(err, StageError::Upstream(_)));
        assert!(state.answer.is_none());
    }
}
