use std::path::PathBuf;

use thiserror::Error;

use crate::stages::StageKind;

/// Process-level error type for JARVIS (configuration, startup, request shape).
#[derive(Debug, Error)]
pub enum JarvisError {
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JarvisError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }
}

/// Failure raised by a single stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    /// A credential the stage needs is not configured.
    #[error("configuration error: {0}")]
    Config(String),
    /// The external provider call failed or returned an error status.
    #[error("upstream error: {0}")]
    Upstream(String),
    /// A required input field is empty.
    #[error("validation error: {0}")]
    Validation(String),
}

impl StageError {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }

    pub fn upstream(reason: impl Into<String>) -> Self {
        Self::Upstream(reason.into())
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    /// The reason without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            StageError::Config(reason)
            | StageError::Upstream(reason)
            | StageError::Validation(reason) => reason,
        }
    }
}

/// Error returned by the dispatcher. Stage errors are passed through untouched
/// apart from the name of the stage that raised them.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("stage `{stage}` failed: {source}")]
    StageFailure {
        stage: StageKind,
        #[source]
        source: StageError,
    },
    #[error("dispatch cancelled at stage `{stage}`")]
    Cancelled { stage: StageKind },
}

impl DispatchError {
    /// Name of the stage that failed or was interrupted.
    pub fn stage(&self) -> StageKind {
        match self {
            DispatchError::StageFailure { stage, .. } => *stage,
            DispatchError::Cancelled { stage } => *stage,
        }
    }

    pub fn stage_error(&self) -> Option<&StageError> {
        match self {
            DispatchError::StageFailure { source, .. } => Some(source),
            DispatchError::Cancelled { .. } => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DispatchError::Cancelled { .. })
    }
}
