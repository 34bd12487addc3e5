//! Per-request pipeline state.
//!
//! The request shape is a tagged enum so the field-presence rules hold by
//! construction: a research state always has a topic, a question state always
//! has a question, and a document state always has a payload. Output fields
//! accumulate on [`PipelineState`] as stages run.

use serde::{Deserialize, Serialize};

use crate::JarvisError;
use crate::providers::SearchResponse;

/// MIME type assumed for documents when the caller does not provide one.
pub const DEFAULT_MIME_TYPE: &str = "text/plain";

/// The three request kinds the dispatcher knows how to route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Research,
    Question,
    Document,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Research => "research",
            RequestKind::Question => "question",
            RequestKind::Document => "document",
        }
    }

    /// Human-readable flow label used in error messages.
    pub fn label(&self) -> &'static str {
        match self {
            RequestKind::Research => "Research",
            RequestKind::Question => "Q&A",
            RequestKind::Document => "Document analysis",
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied input, one variant per request kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Request {
    Research { topic: String, is_deep: bool },
    Question { question: String },
    Document { file_content: String, mime_type: String },
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::Research { .. } => RequestKind::Research,
            Request::Question { .. } => RequestKind::Question,
            Request::Document { .. } => RequestKind::Document,
        }
    }

    /// Classify a loosely-shaped inbound request.
    ///
    /// Priority: a non-empty question wins, then non-empty file content, then a
    /// non-empty topic. An input carrying none of the three is rejected rather
    /// than silently treated as an empty-topic research request.
    pub fn classify(inbound: InboundRequest) -> Result<(Request, String), JarvisError> {
        let InboundRequest {
            topic,
            is_deep,
            question,
            context,
            file_content,
            mime_type,
        } = inbound;
        let context = context.unwrap_or_default();

        if let Some(question) = question.filter(|q| !q.is_empty()) {
            return Ok((Request::Question { question }, context));
        }

        if let Some(file_content) = file_content.filter(|c| !c.is_empty()) {
            let mime_type = mime_type
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());
            return Ok((
                Request::Document {
                    file_content,
                    mime_type,
                },
                String::new(),
            ));
        }

        if let Some(topic) = topic.filter(|t| !t.is_empty()) {
            return Ok((
                Request::Research {
                    topic,
                    is_deep: is_deep.unwrap_or(false),
                },
                String::new(),
            ));
        }

        Err(JarvisError::InvalidRequest(
            "request must carry a non-empty topic, question, or file_content".into(),
        ))
    }
}

/// Loosely-typed request body as it arrives from a generic caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundRequest {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub is_deep: Option<bool>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default, alias = "file_base64")]
    pub file_content: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// A cited source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub uri: String,
}

impl Source {
    pub fn new(title: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            uri: uri.into(),
        }
    }
}

/// State threaded through every stage of one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    request: Request,
    /// Free text the answer is grounded on. Written by the researcher, or
    /// supplied by the caller for questions.
    pub context: String,
    /// Raw payload of the last search call.
    pub search_results: Option<SearchResponse>,
    pub sources: Vec<Source>,
    pub images: Vec<String>,
    pub report: Option<String>,
    pub answer: Option<String>,
}

impl PipelineState {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            context: String::new(),
            search_results: None,
            sources: Vec::new(),
            images: Vec::new(),
            report: None,
            answer: None,
        }
    }

    pub fn research(topic: impl Into<String>, is_deep: bool) -> Self {
        Self::new(Request::Research {
            topic: topic.into(),
            is_deep,
        })
    }

    pub fn question(question: impl Into<String>, context: impl Into<String>) -> Self {
        let mut state = Self::new(Request::Question {
            question: question.into(),
        });
        state.context = context.into();
        state
    }

    pub fn document(file_content: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::new(Request::Document {
            file_content: file_content.into(),
            mime_type: mime_type.into(),
        })
    }

    /// Build a state from a loosely-typed request, see [`Request::classify`].
    pub fn from_inbound(inbound: InboundRequest) -> Result<Self, JarvisError> {
        let (request, context) = Request::classify(inbound)?;
        let mut state = Self::new(request);
        state.context = context;
        Ok(state)
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn kind(&self) -> RequestKind {
        self.request.kind()
    }

    /// Research topic, or the empty string for other request kinds.
    pub fn topic(&self) -> &str {
        match &self.request {
            Request::Research { topic, .. } => topic,
            _ => "",
        }
    }

    pub fn is_deep(&self) -> bool {
        matches!(self.request, Request::Research { is_deep: true, .. })
    }

    /// Question text, or the empty string for other request kinds.
    pub fn question_text(&self) -> &str {
        match &self.request {
            Request::Question { question } => question,
            _ => "",
        }
    }

    /// Document payload and MIME type, when this is a document request.
    pub fn document_payload(&self) -> Option<(&str, &str)> {
        match &self.request {
            Request::Document {
                file_content,
                mime_type,
            } => Some((file_content.as_str(), mime_type.as_str())),
            _ => None,
        }
    }

    /// Short description of what was asked, for logs.
    pub fn subject(&self) -> String {
        match &self.request {
            Request::Research { topic, is_deep } => {
                format!("{} {topic}", if *is_deep { "deep" } else { "quick" })
            }
            Request::Question { question } => question.clone(),
            Request::Document {
                file_content,
                mime_type,
            } => format!("{mime_type} ({} bytes)", file_content.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound() -> InboundRequest {
        InboundRequest::default()
    }

    #[test]
    fn question_wins_over_everything_else() {
        let state = PipelineState::from_inbound(InboundRequest {
            topic: Some("rust".into()),
            question: Some("why?".into()),
            context: Some("ctx".into()),
            file_content: Some("aGVsbG8=".into()),
            ..inbound()
        })
        .unwrap();

        assert_eq!(state.kind(), RequestKind::Question);
        assert_eq!(state.question_text(), "why?");
        assert_eq!(state.context, "ctx");
    }

    #[test]
    fn file_content_beats_topic() {
        let state = PipelineState::from_inbound(InboundRequest {
            topic: Some("rust".into()),
            question: Some(String::new()),
            file_content: Some("aGVsbG8=".into()),
            ..inbound()
        })
        .unwrap();

        assert_eq!(state.kind(), RequestKind::Document);
        assert_eq!(
            state.document_payload(),
            Some(("aGVsbG8=", DEFAULT_MIME_TYPE))
        );
    }

    #[test]
    fn topic_selects_research() {
        let state = PipelineState::from_inbound(InboundRequest {
            topic: Some("ai".into()),
            is_deep: Some(true),
            ..inbound()
        })
        .unwrap();

        assert_eq!(state.kind(), RequestKind::Research);
        assert_eq!(state.topic(), "ai");
        assert!(state.is_deep());
    }

    #[test]
    fn no_discriminant_is_rejected() {
        let err = PipelineState::from_inbound(InboundRequest {
            topic: Some(String::new()),
            context: Some("orphan context".into()),
            ..inbound()
        })
        .unwrap_err();
        assert!(matches!(err, JarvisError::InvalidRequest(_)));
    }

    #[test]
    fn typed_constructors_allow_empty_inputs() {
        let state = PipelineState::research("", false);
        assert_eq!(state.kind(), RequestKind::Research);
        assert!(!state.is_deep());

        let state = PipelineState::question("", "some context");
        assert_eq!(state.kind(), RequestKind::Question);
        assert_eq!(state.question_text(), "");
    }

    #[test]
    fn inbound_accepts_legacy_field_name() {
        let inbound: InboundRequest =
            serde_json::from_str(r#"{"file_base64": "aGk=", "mime_type": "application/pdf"}"#)
                .unwrap();
        assert_eq!(inbound.file_content.as_deref(), Some("aGk="));
    }
}
