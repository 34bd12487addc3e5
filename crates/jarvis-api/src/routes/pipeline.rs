use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use jarvis_core::{DEFAULT_MIME_TYPE, InboundRequest, PipelineState, RequestKind, Source};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ResearchRequest {
    pub topic: String,
    #[serde(default)]
    pub is_deep: bool,
}

#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Deserialize)]
pub struct DocumentAnalysisRequest {
    pub file_base64: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Body returned by the research and document flows.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResearchResult {
    pub report: String,
    pub sources: Vec<Source>,
    pub images: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuestionResult {
    pub answer: String,
}

/// Either response shape, depending on how the request was classified.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DispatchResponse {
    Question(QuestionResult),
    Research(ResearchResult),
}

impl From<PipelineState> for ResearchResult {
    fn from(state: PipelineState) -> Self {
        Self {
            report: state.report.unwrap_or_default(),
            sources: state.sources,
            images: state.images,
        }
    }
}

impl From<PipelineState> for QuestionResult {
    fn from(state: PipelineState) -> Self {
        Self {
            answer: state.answer.unwrap_or_default(),
        }
    }
}

impl From<PipelineState> for DispatchResponse {
    fn from(state: PipelineState) -> Self {
        match state.kind() {
            RequestKind::Question => DispatchResponse::Question(state.into()),
            RequestKind::Research | RequestKind::Document => {
                DispatchResponse::Research(state.into())
            }
        }
    }
}

#[derive(Serialize)]
struct EndpointInfo {
    message: &'static str,
}

pub fn pipeline_router() -> Router<AppState> {
    Router::new()
        .route("/research", get(research_info).post(research))
        .route("/question", post(question))
        .route("/document-analysis", post(document_analysis))
        .route("/dispatch", post(dispatch))
}

async fn research_info() -> Json<EndpointInfo> {
    Json(EndpointInfo {
        message: "API endpoint for research requests",
    })
}

#[instrument(name = "http.research", skip_all)]
async fn research(
    State(state): State<AppState>,
    Json(request): Json<ResearchRequest>,
) -> Result<Json<ResearchResult>, AppError> {
    info!(topic = %request.topic, is_deep = request.is_deep, "research requested");
    let outcome = state
        .run(PipelineState::research(request.topic, request.is_deep))
        .await?;
    Ok(Json(outcome.into()))
}

#[instrument(name = "http.question", skip_all)]
async fn question(
    State(state): State<AppState>,
    Json(request): Json<QuestionRequest>,
) -> Result<Json<QuestionResult>, AppError> {
    info!(chars = request.question.len(), "question received");
    let outcome = state
        .run(PipelineState::question(request.question, request.context))
        .await?;
    Ok(Json(outcome.into()))
}

#[instrument(name = "http.document_analysis", skip_all)]
async fn document_analysis(
    State(state): State<AppState>,
    Json(request): Json<DocumentAnalysisRequest>,
) -> Result<Json<ResearchResult>, AppError> {
    let mime_type = request
        .mime_type
        .filter(|mime| !mime.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());
    info!(mime_type = %mime_type, "document analysis requested");
    let outcome = state
        .run(PipelineState::document(request.file_base64, mime_type))
        .await?;
    Ok(Json(outcome.into()))
}

#[instrument(name = "http.dispatch", skip_all)]
async fn dispatch(
    State(state): State<AppState>,
    Json(request): Json<InboundRequest>,
) -> Result<Json<DispatchResponse>, AppError> {
    let initial = PipelineState::from_inbound(request)?;
    info!(flow = %initial.kind(), "dispatch requested");
    let outcome = state.run(initial).await?;
    Ok(Json(outcome.into()))
}
