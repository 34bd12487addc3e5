use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{GenerationProvider, GenerationRequest, Part, ProviderError, error_body};
use crate::SecretValue;
use crate::config::GenerationConfig;

/// Generation provider speaking the Gemini `generateContent` API.
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    credential_name: String,
    api_key: Option<SecretValue>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationSettings,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<WirePart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WirePart<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationSettings {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(
        config: &GenerationConfig,
        api_key: Option<SecretValue>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            credential_name: config.api_key_env.clone(),
            api_key,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        )
    }
}

fn wire_parts(parts: &[Part]) -> Vec<WirePart<'_>> {
    parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => WirePart::Text { text },
            Part::InlineData { mime_type, data } => WirePart::Inline {
                inline_data: InlineData { mime_type, data },
            },
        })
        .collect()
}

fn extract_text(response: GenerateResponse) -> Result<String, ProviderError> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Decode("response carried no candidates".into()))?;

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        return Err(ProviderError::Decode("candidate carried no text".into()));
    }
    Ok(text)
}

#[async_trait]
impl GenerationProvider for GeminiClient {
    fn credential_name(&self) -> &str {
        &self.credential_name
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(
        name = "provider.generate",
        skip_all,
        fields(model = %self.model, max_output_tokens = request.max_output_tokens)
    )]
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ProviderError::MissingCredential(self.credential_name.clone()))?;

        let body = GenerateBody {
            contents: vec![Content {
                parts: wire_parts(&request.parts),
            }],
            generation_config: GenerationSettings {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", api_key.expose())
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

        let payload: GenerateResponse = response.json().await?;
        let text = extract_text(payload)?;
        debug!(chars = text.len(), "generation provider responded");
        Ok(text)
    }
}
