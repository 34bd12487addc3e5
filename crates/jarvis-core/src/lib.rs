//! JARVIS core: the pipeline dispatcher and its stages.
//!
//! A request (research topic, grounded question, or document) becomes a
//! [`PipelineState`]; the [`Dispatcher`] picks the fixed stage sequence for
//! its kind and runs it, stopping at the first failure.

pub mod config;
mod dispatcher;
mod error;
pub mod metrics;
pub mod providers;
mod security;
pub mod stages;
mod state;
mod telemetry;
mod trace;
mod usage_log;

pub use config::{Config, ConfigLoader};
pub use dispatcher::{DispatchFailure, DispatchOutcome, Dispatcher};
pub use error::{DispatchError, JarvisError, StageError};
pub use security::{SecretValue, optional_env, redact_secrets};
pub use stages::{Stage, StageKind, Stages};
pub use state::{
    DEFAULT_MIME_TYPE, InboundRequest, PipelineState, Request, RequestKind, Source,
};
pub use telemetry::{TelemetryOptions, init_telemetry};
pub use trace::{StageStatus, TraceCollector, TraceEvent, TraceStep, TraceSummary};
pub use usage_log::{UsageEntry, UsageLogger, UsageOutcome};

pub use tokio_util::sync::CancellationToken;
