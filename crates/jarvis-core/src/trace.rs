use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::stages::StageKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Failed,
    Cancelled,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
            StageStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub stage: StageKind,
    pub status: StageStatus,
    pub message: String,
    pub duration_ms: u64,
    pub timestamp_ms: u128,
}

impl TraceEvent {
    pub fn new(
        stage: StageKind,
        status: StageStatus,
        message: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self {
            stage,
            status,
            message: message.into(),
            duration_ms,
            timestamp_ms,
        }
    }
}

/// Ordered record of the stages one dispatch went through.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceCollector {
    events: Vec<TraceEvent>,
}

impl TraceCollector {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn record(
        &mut self,
        stage: StageKind,
        status: StageStatus,
        message: impl Into<String>,
        duration_ms: u64,
    ) {
        self.events
            .push(TraceEvent::new(stage, status, message, duration_ms));
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Stages in the order they ran, regardless of outcome.
    pub fn stages(&self) -> Vec<StageKind> {
        self.events.iter().map(|event| event.stage).collect()
    }

    pub fn summary(&self) -> TraceSummary {
        TraceSummary::from_events(&self.events)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub index: usize,
    pub stage: StageKind,
    pub status: StageStatus,
    pub message: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceSummary {
    pub steps: Vec<TraceStep>,
}

impl TraceSummary {
    pub fn from_events(events: &[TraceEvent]) -> Self {
        let steps = events
            .iter()
            .enumerate()
            .map(|(idx, event)| TraceStep {
                index: idx + 1,
                stage: event.stage,
                status: event.status,
                message: event.message.clone(),
                duration_ms: event.duration_ms,
            })
            .collect();
        Self { steps }
    }

    pub fn render_markdown(&self) -> String {
        if self.steps.is_empty() {
            return "No trace events recorded.".to_string();
        }
        let mut output = String::from("### Trace Summary\n");
        for step in &self.steps {
            let _ = writeln!(
                output,
                "{}. {} [{}, {} ms] -> {}",
                step.index,
                step.stage,
                step.status.as_str(),
                step.duration_ms,
                step.message
            );
        }
        output
    }

    pub fn render_mermaid(&self) -> String {
        if self.steps.is_empty() {
            return "flowchart TD\n  %% no trace events captured".to_string();
        }

        let mut output = String::from("flowchart TD\n  %% auto-generated trace\n");
        for step in &self.steps {
            let node_id = format!("step{}", step.index);
            let label = sanitize_mermaid(&format!("{}: {}", step.stage, step.message));
            let _ = writeln!(output, "  {node_id}[\"{label}\"]");
        }

        for idx in 0..self.steps.len().saturating_sub(1) {
            let from = format!("step{}", idx + 1);
            let to = format!("step{}", idx + 2);
            let _ = writeln!(output, "  {from} --> {to}");
        }

        output
    }
}

fn sanitize_mermaid(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('[', "(")
        .replace(']', ")")
        .replace('\n', "<br/>")
}
