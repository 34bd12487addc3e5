use crate::config::AppConfig;
use crate::error::AppError;
use anyhow::Result;
use axum::http::StatusCode;
use jarvis_core::metrics::duration_ms;
use jarvis_core::{
    CancellationToken, Config, Dispatcher, PipelineState, Stages, UsageEntry, UsageLogger,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<Dispatcher>,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
    usage_log: Option<Arc<UsageLogger>>,
    shutdown: CancellationToken,
}

#[derive(Clone, Debug, Serialize)]
pub struct CapacitySnapshot {
    pub max_concurrency: usize,
    pub available_permits: usize,
    pub running_requests: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct CredentialStatus {
    pub search: bool,
    pub generation: bool,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            dispatcher: Arc::new(dispatcher),
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            usage_log: None,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_usage_log(mut self, logger: UsageLogger) -> Self {
        self.usage_log = Some(Arc::new(logger));
        self
    }

    /// In-flight dispatches are cancelled through child tokens of `token`.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn try_new(config: &AppConfig, core: &Config) -> Result<Self> {
        let stages = Stages::from_config(core)?;
        let mut state = Self::new(Dispatcher::new(stages), config.max_concurrency);
        if config.usage_log {
            let logger = UsageLogger::from_config(&core.logging);
            info!(dir = %logger.base_dir().display(), "usage log enabled");
            state = state.with_usage_log(logger);
        }
        Ok(state)
    }

    pub fn acquire_permit(&self) -> Result<OwnedSemaphorePermit, AppError> {
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => Ok(permit),
            Err(TryAcquireError::NoPermits) => Err(AppError::new(
                StatusCode::TOO_MANY_REQUESTS,
                "request capacity reached; retry once a slot frees up",
            )),
            Err(TryAcquireError::Closed) => Err(AppError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "dispatcher unavailable",
            )),
        }
    }

    pub fn capacity(&self) -> CapacitySnapshot {
        let available = self.permits.available_permits();
        CapacitySnapshot {
            max_concurrency: self.max_concurrency,
            available_permits: available,
            running_requests: self.max_concurrency.saturating_sub(available),
        }
    }

    pub fn credentials(&self) -> CredentialStatus {
        let stages = self.dispatcher.stages();
        CredentialStatus {
            search: stages.search_configured(),
            generation: stages.generation_configured(),
        }
    }

    /// Dispatch one request under a capacity permit and record its usage line.
    pub async fn run(&self, state: PipelineState) -> Result<PipelineState, AppError> {
        let _permit = self.acquire_permit()?;
        let request_id = Uuid::new_v4().to_string();
        let flow = state.kind();
        let subject = state.subject();
        let cancel = self.shutdown.child_token();

        let span = info_span!("request", request_id = %request_id, flow = %flow);
        let started = Instant::now();
        let result = self
            .dispatcher
            .dispatch(state, &cancel)
            .instrument(span)
            .await;
        let elapsed_ms = duration_ms(started.elapsed());

        if let Some(logger) = &self.usage_log {
            logger.record_or_warn(UsageEntry::from_result(
                request_id.clone(),
                flow,
                subject,
                elapsed_ms,
                result.as_ref(),
            ));
        }

        result.map_err(|err| {
            warn!(request_id = %request_id, error = %err, "request failed");
            AppError::dispatch(flow, &err)
        })
    }
}
