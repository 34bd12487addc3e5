use anyhow::Result;
use once_cell::sync::OnceCell;
use std::time::Duration;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{KeyValue, global};
use tracing::info;

use crate::stages::StageKind;
use crate::state::RequestKind;

struct PipelineMetrics {
    stage_runs: Counter<u64>,
    stage_duration_ms: Histogram<f64>,
    dispatches: Counter<u64>,
}

static METRICS: OnceCell<PipelineMetrics> = OnceCell::new();

fn handles() -> &'static PipelineMetrics {
    METRICS.get_or_init(|| {
        let meter: Meter = global::meter("jarvis.pipeline");
        PipelineMetrics {
            stage_runs: meter
                .u64_counter("pipeline_stage_runs_total")
                .with_description("Total stage executions by stage and status")
                .init(),
            stage_duration_ms: meter
                .f64_histogram("pipeline_stage_duration_ms")
                .with_description("Stage runtime in milliseconds")
                .init(),
            dispatches: meter
                .u64_counter("pipeline_dispatch_total")
                .with_description("Completed dispatches by flow and status")
                .init(),
        }
    })
}

/// Hint to operators that OTEL metrics export can be configured externally.
pub fn init_metrics_from_env(service_name: &str) -> Result<()> {
    if std::env::var("JARVIS_OTEL_METRICS_ENDPOINT").is_ok() {
        info!(
            target = "telemetry",
            "JARVIS_OTEL_METRICS_ENDPOINT detected for {service_name}. Configure an OTLP meter provider in your deployment to export pipeline metrics."
        );
    }
    Ok(())
}

/// Record one stage execution (no-op if no provider installed).
pub fn record_stage_metrics(stage: StageKind, status: &'static str, duration_ms: u64) {
    let metrics = handles();
    let attrs = [
        KeyValue::new("stage", stage.as_str()),
        KeyValue::new("status", status),
    ];

    metrics.stage_runs.add(1, &attrs);
    metrics.stage_duration_ms.record(duration_ms as f64, &attrs);
}

/// Record the outcome of a whole dispatch.
pub fn record_dispatch_metrics(flow: RequestKind, status: &'static str) {
    let attrs = [
        KeyValue::new("flow", flow.as_str()),
        KeyValue::new("status", status),
    ];
    handles().dispatches.add(1, &attrs);
}

/// Whole milliseconds in `elapsed`, saturating at `u64::MAX`.
pub fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_ms_truncates_and_saturates() {
        assert_eq!(duration_ms(Duration::from_micros(1_999)), 1);
        assert_eq!(duration_ms(Duration::from_secs(90)), 90_000);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
    }
}
