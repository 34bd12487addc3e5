mod health;
mod pipeline;

use axum::{Json, Router, routing::get};
use health::health_router;
use pipeline::pipeline_router;
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

pub use pipeline::{DispatchResponse, QuestionResult, ResearchResult};

#[derive(Serialize)]
struct RootResponse {
    message: &'static str,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .merge(health_router())
        .nest("/api", pipeline_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "JARVIS Research System Backend is running",
    })
}
