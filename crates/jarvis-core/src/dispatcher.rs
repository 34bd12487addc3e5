//! Routes a request through the fixed stage sequence for its kind.
//!
//! Stages run strictly one after another against the same state. The first
//! failure stops the dispatch; nothing is retried and nothing already written
//! to the state is rolled back. Cancellation is checked before each stage and
//! raced against the running one, so an abandoned request stops at whichever
//! provider call is in flight.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::error::DispatchError;
use crate::metrics::{duration_ms, record_dispatch_metrics, record_stage_metrics};
use crate::stages::{StageKind, Stages};
use crate::state::{PipelineState, RequestKind};
use crate::trace::{StageStatus, TraceCollector};

const RESEARCH_FLOW: &[StageKind] = &[
    StageKind::Researcher,
    StageKind::ImageExtractor,
    StageKind::SourceDeduplicator,
    StageKind::ReportGenerator,
];
const QUESTION_FLOW: &[StageKind] = &[StageKind::QuestionAnswerer];
const DOCUMENT_FLOW: &[StageKind] = &[StageKind::DocumentAnalyzer];

impl RequestKind {
    /// Ordered stages run for this kind of request.
    pub fn plan(&self) -> &'static [StageKind] {
        match self {
            RequestKind::Research => RESEARCH_FLOW,
            RequestKind::Question => QUESTION_FLOW,
            RequestKind::Document => DOCUMENT_FLOW,
        }
    }
}

/// Final state plus the per-stage trace of one dispatch.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub state: PipelineState,
    pub trace: TraceCollector,
}

/// Failed dispatch together with the trace gathered up to the failure.
#[derive(Debug)]
pub struct DispatchFailure {
    pub error: DispatchError,
    pub trace: TraceCollector,
}

#[derive(Clone)]
pub struct Dispatcher {
    stages: Stages,
}

impl Dispatcher {
    pub fn new(stages: Stages) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &Stages {
        &self.stages
    }

    /// Run the flow selected by the state's request kind.
    pub async fn dispatch(
        &self,
        state: PipelineState,
        cancel: &CancellationToken,
    ) -> Result<PipelineState, DispatchError> {
        self.dispatch_with_trace(state, cancel)
            .await
            .map(|outcome| outcome.state)
            .map_err(|failure| failure.error)
    }

    /// Same as [`Dispatcher::dispatch`] but keeps the stage trace.
    pub async fn dispatch_with_trace(
        &self,
        state: PipelineState,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome, DispatchFailure> {
        let flow = state.kind();
        let span = info_span!("dispatch", flow = %flow);
        let result = self.run_flow(flow, state, cancel).instrument(span).await;

        let status = match &result {
            Ok(_) => "ok",
            Err(failure) if failure.error.is_cancelled() => "cancelled",
            Err(_) => "error",
        };
        record_dispatch_metrics(flow, status);
        result
    }

    async fn run_flow(
        &self,
        flow: RequestKind,
        mut state: PipelineState,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome, DispatchFailure> {
        let plan = flow.plan();
        let mut trace = TraceCollector::new();
        info!(stages = plan.len(), "dispatch started");

        for &kind in plan {
            if cancel.is_cancelled() {
                warn!(stage = %kind, "dispatch cancelled before stage");
                trace.record(kind, StageStatus::Cancelled, "not started", 0);
                return Err(DispatchFailure {
                    error: DispatchError::Cancelled { stage: kind },
                    trace,
                });
            }

            let stage = self.stages.get(kind);
            let started = Instant::now();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = stage.run(&mut state) => Some(result),
            };
            let elapsed_ms = duration_ms(started.elapsed());

            match result {
                Some(Ok(())) => {
                    debug!(stage = %kind, elapsed_ms, "stage completed");
                    record_stage_metrics(kind, "ok", elapsed_ms);
                    trace.record(kind, StageStatus::Completed, stage_note(kind, &state), elapsed_ms);
                }
                Some(Err(source)) => {
                    warn!(stage = %kind, error = %source, elapsed_ms, "stage failed");
                    record_stage_metrics(kind, "error", elapsed_ms);
                    trace.record(kind, StageStatus::Failed, source.to_string(), elapsed_ms);
                    return Err(DispatchFailure {
                        error: DispatchError::StageFailure {
                            stage: kind,
                            source,
                        },
                        trace,
                    });
                }
                None => {
                    warn!(stage = %kind, elapsed_ms, "dispatch cancelled during stage");
                    record_stage_metrics(kind, "cancelled", elapsed_ms);
                    trace.record(kind, StageStatus::Cancelled, "interrupted", elapsed_ms);
                    return Err(DispatchFailure {
                        error: DispatchError::Cancelled { stage: kind },
                        trace,
                    });
                }
            }
        }

        info!("dispatch completed");
        Ok(DispatchOutcome { state, trace })
    }
}

fn stage_note(kind: StageKind, state: &PipelineState) -> String {
    match kind {
        StageKind::Researcher => format!(
            "{} sources, {} images, {} chars of context",
            state.sources.len(),
            state.images.len(),
            state.context.len()
        ),
        StageKind::ImageExtractor => format!("{} images", state.images.len()),
        StageKind::SourceDeduplicator => format!("{} unique sources", state.sources.len()),
        StageKind::ReportGenerator | StageKind::DocumentAnalyzer => format!(
            "report of {} chars",
            state.report.as_deref().map(str::len).unwrap_or(0)
        ),
        StageKind::QuestionAnswerer => format!(
            "answer of {} chars",
            state.answer.as_deref().map(str::len).unwrap_or(0)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::providers::{SearchHit, SearchResponse};
    use crate::stages::NO_QUESTION_ANSWER;
    use crate::stages::test_support::{FakeGeneration, FakeSearch};

    fn dispatcher(search: Arc<FakeSearch>, generation: Arc<FakeGeneration>) -> Dispatcher {
        Dispatcher::new(Stages::new(search, generation, 5, "advanced"))
    }

    fn two_results() -> SearchResponse {
        SearchResponse {
            answer: None,
            results: vec![
                SearchHit {
                    title: Some("One".into()),
                    content: Some("first".into()),
                    url: Some("u1".into()),
                    score: None,
                },
                SearchHit {
                    title: Some("Two".into()),
                    content: Some("second".into()),
                    url: Some("u2".into()),
                    score: None,
                },
            ],
            images: Some(vec!["i1".into()]),
        }
    }

    #[test]
    fn plans_are_fixed() {
        assert_eq!(
            RequestKind::Research.plan(),
            &[
                StageKind::Researcher,
                StageKind::ImageExtractor,
                StageKind::SourceDeduplicator,
                StageKind::ReportGenerator
            ]
        );
        assert_eq!(RequestKind::Question.plan(), &[StageKind::QuestionAnswerer]);
        assert_eq!(RequestKind::Document.plan(), &[StageKind::DocumentAnalyzer]);
    }

    #[tokio::test]
    async fn research_flow_runs_all_four_stages_in_order() {
        let search = Arc::new(FakeSearch::returning(two_results()));
        let generation = Arc::new(FakeGeneration::returning("report body"));
        let dispatcher = dispatcher(search.clone(), generation.clone());

        let outcome = dispatcher
            .dispatch_with_trace(PipelineState::research("ai", false), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.trace.stages(), RequestKind::Research.plan());
        assert_eq!(outcome.state.report.as_deref(), Some("report body"));
        assert_eq!(search.calls(), 1);
        assert_eq!(generation.calls(), 1);
    }

    #[tokio::test]
    async fn question_flow_runs_only_the_answerer() {
        let search = Arc::new(FakeSearch::returning(two_results()));
        let generation = Arc::new(FakeGeneration::returning("answer"));
        let dispatcher = dispatcher(search.clone(), generation);

        let outcome = dispatcher
            .dispatch_with_trace(PipelineState::question("q", "c"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.trace.stages(), vec![StageKind::QuestionAnswerer]);
        assert_eq!(outcome.state.answer.as_deref(), Some("answer"));
        assert_eq!(search.calls(), 0);
    }

    #[tokio::test]
    async fn empty_question_never_reaches_the_provider() {
        let generation = Arc::new(FakeGeneration::returning("unused"));
        let dispatcher = dispatcher(
            Arc::new(FakeSearch::returning(SearchResponse::default())),
            generation.clone(),
        );

        let state = dispatcher
            .dispatch(PipelineState::question("", ""), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(state.answer.as_deref(), Some(NO_QUESTION_ANSWER));
        assert_eq!(generation.calls(), 0);
    }

    #[tokio::test]
    async fn first_failure_stops_the_sequence() {
        let search = Arc::new(FakeSearch::failing(500));
        let generation = Arc::new(FakeGeneration::returning("unused"));
        let dispatcher = dispatcher(search, generation.clone());

        let failure = dispatcher
            .dispatch_with_trace(PipelineState::research("ai", true), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(failure.error.stage(), StageKind::Researcher);
        assert_eq!(failure.trace.stages(), vec![StageKind::Researcher]);
        assert_eq!(generation.calls(), 0);
    }

    #[tokio::test]
    async fn late_failure_keeps_earlier_trace() {
        let search = Arc::new(FakeSearch::returning(two_results()));
        let generation = Arc::new(FakeGeneration::failing(503));
        let dispatcher = dispatcher(search, generation);

        let failure = dispatcher
            .dispatch_with_trace(PipelineState::research("ai", false), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(failure.error.stage(), StageKind::ReportGenerator);
        assert_eq!(failure.trace.stages(), RequestKind::Research.plan());
        assert!(matches!(
            failure.error,
            DispatchError::StageFailure {
                source: crate::error::StageError::Upstream(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_the_first_stage() {
        let search = Arc::new(FakeSearch::returning(two_results()));
        let dispatcher = dispatcher(search.clone(), Arc::new(FakeGeneration::returning("x")));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = dispatcher
            .dispatch(PipelineState::research("ai", false), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Cancelled {
                stage: StageKind::Researcher
            }
        ));
        assert_eq!(search.calls(), 0);
    }
}
