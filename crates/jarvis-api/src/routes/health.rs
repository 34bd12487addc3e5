use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::state::{AppState, CapacitySnapshot, CredentialStatus};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    capacity: CapacitySnapshot,
    credentials: CredentialStatus,
}

pub fn health_router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let credentials = state.credentials();
    let status = if credentials.search && credentials.generation {
        "ok"
    } else {
        "degraded"
    };
    Json(HealthResponse {
        status,
        capacity: state.capacity(),
        credentials,
    })
}
