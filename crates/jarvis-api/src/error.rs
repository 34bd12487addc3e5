use axum::{Json, http::StatusCode, response::IntoResponse};
use jarvis_core::{DispatchError, JarvisError, RequestKind};
use serde::Serialize;
use std::fmt;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(error: impl ToString) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
    }

    /// Map a failed dispatch onto a status code, prefixed with the flow label.
    pub fn dispatch(flow: RequestKind, error: &DispatchError) -> Self {
        match error {
            DispatchError::StageFailure { source, .. } => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("{} failed: {}", flow.label(), source.message()),
            ),
            DispatchError::Cancelled { .. } => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("{} cancelled: server is shutting down", flow.label()),
            ),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let payload = ErrorResponse {
            error: self.message,
        };
        (self.status, Json(payload)).into_response()
    }
}

impl From<JarvisError> for AppError {
    fn from(error: JarvisError) -> Self {
        match error {
            JarvisError::InvalidRequest(_) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, error.to_string())
            }
            other => Self::internal(other),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::internal(error)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;
    use jarvis_core::{StageError, StageKind};

    #[test]
    fn stage_failure_is_prefixed_with_flow_label() {
        let err = AppError::dispatch(
            RequestKind::Question,
            &DispatchError::StageFailure {
                stage: StageKind::QuestionAnswerer,
                source: StageError::config("GOOGLE_API_KEY not configured"),
            },
        );
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Q&A failed: GOOGLE_API_KEY not configured");
    }

    #[test]
    fn unclassifiable_request_is_unprocessable() {
        let err = AppError::from(JarvisError::InvalidRequest("empty".into()));
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
