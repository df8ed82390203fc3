// src/worker_logic.rs

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};

use itertools::Itertools;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::data_model::{FileTask, Record, UnitId};
use crate::error::PipelineError;
use crate::fault::{Fault, FaultReporter, Stage};
use crate::pipeline::readers::RowParser;
use crate::pipeline::writers::ReportGenerator;
use crate::queue::IngestionQueue;
use crate::store::RecordStore;
use crate::utils::prometheus_metrics::*;

/// Everything a worker needs to process a file. Cheap to clone; shared by
/// all workers of one pipeline.
#[derive(Clone)]
pub struct WorkerContext {
    pub store: Arc<dyn RecordStore>,
    pub reports: Arc<dyn ReportGenerator>,
    pub parser: Arc<dyn RowParser>,
    pub faults: FaultReporter,
    pub file_timeout: Option<Duration>,
    pub unit_locks: Arc<UnitLocks>,
}

/// One async lock per unit id. Holding it across query and generate keeps
/// two workers from publishing reports for the same unit out of order.
#[derive(Debug, Default)]
pub struct UnitLocks {
    locks: std::sync::Mutex<HashMap<UnitId, Arc<Mutex<()>>>>,
}

impl UnitLocks {
    pub async fn lock(&self, unit: &UnitId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Entries nobody holds or waits on are dropped.
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            Arc::clone(locks.entry(*unit).or_default())
        };
        lock.lock_owned().await
    }
}

/// What happened to one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub records: usize,
    pub rejected_rows: usize,
    pub persisted: bool,
    pub reports_generated: usize,
    pub report_failures: usize,
}

/// Reads, parses, persists and reports one file. Every failure goes to the
/// fault reporter; nothing here stops the caller from taking the next file.
pub async fn process_one(ctx: &WorkerContext, task: &FileTask) -> FileOutcome {
    let timer = FILE_PROCESSING_DURATION_SECONDS.start_timer();

    let outcome = match ctx.file_timeout {
        Some(limit) => match tokio::time::timeout(limit, process_file(ctx, task)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                ctx.faults.report(
                    Fault::new(
                        Stage::Worker,
                        PipelineError::Timeout {
                            seconds: limit.as_secs(),
                        },
                    )
                    .with_path(task.path()),
                );
                FileOutcome {
                    path: task.path().to_path_buf(),
                    ..Default::default()
                }
            }
        },
        None => process_file(ctx, task).await,
    };

    timer.observe_duration();
    FILES_PROCESSED_TOTAL.inc();
    outcome
}

async fn process_file(ctx: &WorkerContext, task: &FileTask) -> FileOutcome {
    let mut outcome = FileOutcome {
        path: task.path().to_path_buf(),
        ..Default::default()
    };

    let bytes = match tokio::fs::read(task.path()).await {
        Ok(bytes) => bytes,
        Err(e) => {
            ctx.faults
                .report(Fault::new(Stage::Worker, e.into()).with_path(task.path()));
            return outcome;
        }
    };

    let parser = Arc::clone(&ctx.parser);
    let parsed = match tokio::task::spawn_blocking(move || {
        parser.parse(&String::from_utf8_lossy(&bytes))
    })
    .await
    {
        Ok(parsed) => parsed,
        Err(e) => {
            ctx.faults
                .report(Fault::new(Stage::Parser, e.into()).with_path(task.path()));
            return outcome;
        }
    };

    outcome.records = parsed.records.len();
    outcome.rejected_rows = parsed.errors.len();
    ROWS_PARSED_TOTAL.inc_by(parsed.records.len() as f64);
    ROWS_REJECTED_TOTAL.inc_by(parsed.errors.len() as f64);
    for row_error in parsed.errors {
        ctx.faults
            .report(Fault::from_row_error(task.path(), row_error));
    }

    if parsed.records.is_empty() {
        debug!("No valid rows; nothing to persist");
        return outcome;
    }

    if let Err(e) = ctx.store.insert_batch(&parsed.records).await {
        BATCH_INSERT_FAILURES_TOTAL.inc();
        ctx.faults
            .report(Fault::new(Stage::Store, e).with_path(task.path()));
        return outcome;
    }
    BATCHES_INSERTED_TOTAL.inc();
    outcome.persisted = true;

    for unit in units_in_report_order(&parsed.records) {
        match generate_unit_report(ctx, &unit).await {
            Ok(path) => {
                REPORTS_GENERATED_TOTAL.inc();
                outcome.reports_generated += 1;
                debug!(unit = %unit, report = %path.display(), "Report generated");
            }
            Err((stage, e)) => {
                REPORT_FAILURES_TOTAL.inc();
                outcome.report_failures += 1;
                ctx.faults.report(
                    Fault::new(stage, e)
                        .with_path(task.path())
                        .with_input(unit.to_string()),
                );
            }
        }
    }

    outcome
}

/// Distinct unit ids of a batch, descending by their string form.
pub fn units_in_report_order(records: &[Record]) -> Vec<UnitId> {
    records
        .iter()
        .map(|r| r.unit_guid)
        .unique()
        .map(|unit| (unit.to_string(), unit))
        .sorted_by(|a, b| b.0.cmp(&a.0))
        .map(|(_, unit)| unit)
        .collect()
}

/// Reports cover everything stored for the unit, not only this batch.
async fn generate_unit_report(
    ctx: &WorkerContext,
    unit: &UnitId,
) -> std::result::Result<PathBuf, (Stage, PipelineError)> {
    let _guard = ctx.unit_locks.lock(unit).await;
    let records = ctx
        .store
        .query_by_unit(unit, 0, None)
        .await
        .map_err(|e| (Stage::Store, e))?;
    ctx.reports
        .generate(unit, &records)
        .await
        .map_err(|e| (Stage::Report, e))
}

/// Worker loop: takes files off the queue until it is closed.
///
/// A file already being processed when the queue closes is finished first, so
/// a batch is never abandoned mid-insert by shutdown.
pub async fn run_worker(worker_id: usize, queue: IngestionQueue, ctx: WorkerContext) -> u64 {
    ACTIVE_WORKERS.inc();
    info!(worker_id, "Processing worker started");
    let mut processed = 0u64;

    while let Some(task) = queue.dequeue().await {
        QUEUE_DEPTH.set(queue.len() as f64);
        let span = info_span!("process_file", worker_id, path = %task);
        let outcome = process_one(&ctx, &task).instrument(span).await;
        processed += 1;

        if outcome.persisted {
            info!(
                worker_id,
                path = %task,
                records = outcome.records,
                rejected = outcome.rejected_rows,
                reports = outcome.reports_generated,
                "File processed"
            );
        } else {
            warn!(worker_id, path = %task, rejected = outcome.rejected_rows, "File produced no persisted records");
        }
    }

    ACTIVE_WORKERS.dec();
    info!(worker_id, files_processed = processed, "Processing worker stopped");
    processed
}
