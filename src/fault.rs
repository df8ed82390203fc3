// src/fault.rs

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::error::PipelineError;
use crate::pipeline::readers::RowError;
use crate::utils::prometheus_metrics::FAULTS_TOTAL;

/// Pipeline stage a fault originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Watcher,
    Parser,
    Worker,
    Store,
    Report,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Watcher => "watcher",
            Stage::Parser => "parser",
            Stage::Worker => "worker",
            Stage::Store => "store",
            Stage::Report => "report",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recoverable failure with enough context to diagnose it from the log.
#[derive(Debug)]
pub struct Fault {
    pub stage: Stage,
    pub error: PipelineError,
    pub path: Option<PathBuf>,
    pub row: Option<usize>,
    pub input: Option<String>,
    pub at: DateTime<Utc>,
}

impl Fault {
    pub fn new(stage: Stage, error: PipelineError) -> Self {
        Fault {
            stage,
            error,
            path: None,
            row: None,
            input: None,
            at: Utc::now(),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// A rejected row of `path`.
    pub fn from_row_error(path: &Path, row_error: RowError) -> Self {
        let fault = Fault::new(Stage::Parser, row_error.error)
            .with_path(path)
            .with_row(row_error.row);
        if row_error.input.is_empty() {
            fault
        } else {
            fault.with_input(row_error.input)
        }
    }
}

/// Cloneable, non-blocking handle every stage reports faults through.
#[derive(Debug, Clone)]
pub struct FaultReporter {
    tx: mpsc::UnboundedSender<Fault>,
}

impl FaultReporter {
    /// Creates a reporter and the receiving end that [`drain_faults`] consumes.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Fault>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (FaultReporter { tx }, rx)
    }

    pub fn report(&self, fault: Fault) {
        if let Err(mpsc::error::SendError(fault)) = self.tx.send(fault) {
            // Drain is gone (shutdown); still leave a trace.
            log_fault(&fault);
        }
    }
}

/// Fault counts collected by the drain task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FaultSummary {
    pub by_stage: BTreeMap<Stage, u64>,
}

impl FaultSummary {
    pub fn total(&self) -> u64 {
        self.by_stage.values().sum()
    }

    pub fn count(&self, stage: Stage) -> u64 {
        self.by_stage.get(&stage).copied().unwrap_or(0)
    }

    fn record(&mut self, stage: Stage) {
        *self.by_stage.entry(stage).or_insert(0) += 1;
    }
}

fn log_fault(fault: &Fault) {
    let path = fault
        .path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let input = fault.input.as_deref().unwrap_or_default();

    if fault.error.is_row_level() {
        warn!(
            stage = %fault.stage,
            path = %path,
            row = ?fault.row,
            input = %input,
            error = %fault.error,
            at = %fault.at,
            "Row rejected"
        );
    } else {
        error!(
            stage = %fault.stage,
            path = %path,
            row = ?fault.row,
            input = %input,
            error = %fault.error,
            at = %fault.at,
            "Ingestion fault"
        );
    }
}

/// Logs every fault until all reporters are dropped, then returns the counts.
pub async fn drain_faults(mut rx: mpsc::UnboundedReceiver<Fault>) -> FaultSummary {
    let mut summary = FaultSummary::default();
    while let Some(fault) = rx.recv().await {
        log_fault(&fault);
        FAULTS_TOTAL.with_label_values(&[fault.stage.as_str()]).inc();
        summary.record(fault.stage);
    }
    summary
}
