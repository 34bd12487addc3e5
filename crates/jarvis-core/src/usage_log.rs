//! Append-only JSONL usage log, one line per dispatch.
//!
//! Lines land in `<dir>/<YYYY>/<MM>/usage.jsonl`. Free text is scrubbed for
//! credentials first; whenever something was scrubbed an audit line is also
//! written to `audit.jsonl` next to it. Files older than the retention window
//! are pruned after every write.

use std::collections::HashSet;
use std::fs::{self, OpenOptions, create_dir_all};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use serde::Serialize;
use tracing::warn;

use crate::config::LoggingConfig;
use crate::error::DispatchError;
use crate::security::redact;
use crate::state::{PipelineState, RequestKind};

const LOG_DIR_ENV: &str = "JARVIS_LOG_DIR";
const RETENTION_ENV: &str = "JARVIS_LOG_RETENTION_DAYS";

/// Everything worth remembering about one dispatch.
#[derive(Debug, Clone)]
pub struct UsageEntry {
    pub request_id: String,
    pub flow: RequestKind,
    pub subject: String,
    pub duration_ms: u64,
    pub outcome: UsageOutcome,
}

#[derive(Debug, Clone)]
pub enum UsageOutcome {
    Completed { sources: usize, images: usize },
    Failed { stage: String, error: String },
    Cancelled { stage: String },
}

impl UsageEntry {
    pub fn from_result(
        request_id: impl Into<String>,
        flow: RequestKind,
        subject: impl Into<String>,
        duration_ms: u64,
        result: Result<&PipelineState, &DispatchError>,
    ) -> Self {
        let outcome = match result {
            Ok(state) => UsageOutcome::Completed {
                sources: state.sources.len(),
                images: state.images.len(),
            },
            Err(DispatchError::Cancelled { stage }) => UsageOutcome::Cancelled {
                stage: stage.to_string(),
            },
            Err(DispatchError::StageFailure { stage, source }) => UsageOutcome::Failed {
                stage: stage.to_string(),
                error: source.to_string(),
            },
        };
        Self {
            request_id: request_id.into(),
            flow,
            subject: subject.into(),
            duration_ms,
            outcome,
        }
    }
}

#[derive(Serialize)]
struct UsageRecord {
    timestamp: String,
    request_id: String,
    flow: RequestKind,
    status: &'static str,
    subject: String,
    duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    failed_stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    source_count: usize,
    image_count: usize,
    redactions: Vec<String>,
}

#[derive(Serialize)]
struct AuditRecord {
    timestamp: String,
    request_id: String,
    redactions: Vec<String>,
}

/// Writes usage lines under a base directory.
#[derive(Debug, Clone)]
pub struct UsageLogger {
    base_dir: PathBuf,
    retention_days: u64,
}

impl UsageLogger {
    pub fn new(base_dir: impl Into<PathBuf>, retention_days: u64) -> Self {
        Self {
            base_dir: base_dir.into(),
            retention_days,
        }
    }

    /// Build from configuration; `JARVIS_LOG_DIR` and
    /// `JARVIS_LOG_RETENTION_DAYS` override the file values.
    pub fn from_config(config: &LoggingConfig) -> Self {
        let base_dir = std::env::var(LOG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| config.usage_log_dir.clone());
        let retention_days = std::env::var(RETENTION_ENV)
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(config.retention_days);
        Self::new(base_dir, retention_days)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Append one entry. Errors are returned; see [`UsageLogger::record_or_warn`].
    pub fn record(&self, entry: UsageEntry) -> Result<()> {
        let timestamp = Utc::now();
        let mut redactions = HashSet::new();

        let subject = redact(&entry.subject, &mut redactions);
        let (status, failed_stage, error, source_count, image_count) = match entry.outcome {
            UsageOutcome::Completed { sources, images } => ("ok", None, None, sources, images),
            UsageOutcome::Failed { stage, error } => (
                "error",
                Some(stage),
                Some(redact(&error, &mut redactions)),
                0,
                0,
            ),
            UsageOutcome::Cancelled { stage } => ("cancelled", Some(stage), None, 0, 0),
        };

        let mut redactions: Vec<String> = redactions.into_iter().collect();
        redactions.sort();

        let record = UsageRecord {
            timestamp: timestamp.to_rfc3339(),
            request_id: entry.request_id.clone(),
            flow: entry.flow,
            status,
            subject,
            duration_ms: entry.duration_ms,
            failed_stage,
            error,
            source_count,
            image_count,
            redactions,
        };

        let month_dir = self
            .base_dir
            .join(format!("{:04}", timestamp.year()))
            .join(format!("{:02}", timestamp.month()));
        append_json_line(&month_dir.join("usage.jsonl"), &record)?;

        if !record.redactions.is_empty() {
            let audit = AuditRecord {
                timestamp: record.timestamp.clone(),
                request_id: entry.request_id.clone(),
                redactions: record.redactions.clone(),
            };
            append_json_line(&month_dir.join("audit.jsonl"), &audit)?;
            warn!(
                request_id = %entry.request_id,
                fields = ?record.redactions,
                "redacted potential secrets from usage log"
            );
        }

        self.enforce_retention(&month_dir)?;
        Ok(())
    }

    /// Usage logging must never fail a request; log and move on.
    pub fn record_or_warn(&self, entry: UsageEntry) {
        if let Err(err) = self.record(entry) {
            warn!(error = %err, dir = %self.base_dir.display(), "failed to write usage log");
        }
    }

    /// Prune expired files and empty directories, never removing `active` or its parents.
    fn enforce_retention(&self, active: &Path) -> Result<()> {
        if self.retention_days == 0 || !self.base_dir.exists() {
            return Ok(());
        }
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(
                self.retention_days.saturating_mul(86_400),
            ))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        prune_directory(&self.base_dir, cutoff, active)
    }
}

fn append_json_line<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }

    let open = || OpenOptions::new().create(true).append(true).open(path);
    let file = match open() {
        // A concurrent retention pass may have removed the empty directory.
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                create_dir_all(parent)?;
            }
            open()
        }
        other => other,
    }
    .with_context(|| format!("failed to open log file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let line = serde_json::to_string(value)?;
    writeln!(writer, "{}", line)
        .with_context(|| format!("failed to append log entry to {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

fn prune_directory(dir: &Path, cutoff: SystemTime, keep: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            prune_directory(&path, cutoff, keep)?;
            if !keep.starts_with(&path) && path.read_dir()?.next().is_none() {
                fs::remove_dir(&path).ok();
            }
        } else if metadata.is_file()
            && metadata
                .modified()
                .map(|time| time < cutoff)
                .unwrap_or(false)
        {
            fs::remove_file(&path).ok();
        }
    }

    Ok(())
}
