// src/executor.rs

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::IngestConfig;
use crate::error::Result;
use crate::fault::{drain_faults, FaultReporter, FaultSummary};
use crate::pipeline::readers::{RowParser, TsvReader};
use crate::pipeline::writers::ReportGenerator;
use crate::queue::IngestionQueue;
use crate::store::RecordStore;
use crate::watcher_logic::DirectoryWatcher;
use crate::worker_logic::{run_worker, UnitLocks, WorkerContext};

/// Totals for one pipeline run, returned after shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub files_enqueued: u64,
    pub files_processed: u64,
    pub faults: FaultSummary,
}

/// Wires the watcher, the queue, the workers and the fault drain together
/// and runs them until shutdown.
pub struct PipelineExecutor {
    config: IngestConfig,
    store: Arc<dyn RecordStore>,
    reports: Arc<dyn ReportGenerator>,
    parser: Arc<dyn RowParser>,
}

impl PipelineExecutor {
    pub fn new(
        config: IngestConfig,
        store: Arc<dyn RecordStore>,
        reports: Arc<dyn ReportGenerator>,
    ) -> Self {
        PipelineExecutor {
            config,
            store,
            reports,
            parser: Arc::new(TsvReader::new()),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn RowParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Runs until `shutdown` is cancelled.
    ///
    /// Fails only when the pipeline cannot start (bad queue capacity,
    /// unreachable store). Once running, every failure is a fault.
    #[instrument(name = "pipeline", skip_all, fields(store = self.store.name(), reports = self.reports.name()))]
    pub async fn run(&self, shutdown: CancellationToken) -> Result<RunSummary> {
        let queue = IngestionQueue::new(self.config.queue.capacity)?;
        let (faults, fault_rx) = FaultReporter::channel();
        let drain = tokio::spawn(drain_faults(fault_rx));

        let watcher = match DirectoryWatcher::initialize(
            &self.config.watch.directory,
            self.config.watch.poll_interval(),
            queue.clone(),
            Arc::clone(&self.store),
            faults.clone(),
        )
        .await
        {
            Ok(watcher) => watcher,
            Err(e) => {
                drop(faults);
                let _ = drain.await;
                return Err(e);
            }
        };

        let watcher_handle = tokio::spawn(watcher.run(shutdown.child_token()));

        let ctx = WorkerContext {
            store: Arc::clone(&self.store),
            reports: Arc::clone(&self.reports),
            parser: Arc::clone(&self.parser),
            faults,
            file_timeout: self.config.workers.file_timeout(),
            unit_locks: Arc::new(UnitLocks::default()),
        };
        let worker_handles: Vec<_> = (0..self.config.workers.count)
            .map(|id| tokio::spawn(run_worker(id, queue.clone(), ctx.clone())))
            .collect();
        // Workers and the watcher now hold the only reporters; the drain ends
        // once they have all exited.
        drop(ctx);

        info!(
            workers = self.config.workers.count,
            queue_capacity = queue.capacity(),
            "Pipeline running"
        );

        shutdown.cancelled().await;
        info!("Shutdown requested, closing ingestion queue");
        queue.close();

        let files_enqueued = match watcher_handle.await {
            Ok(n) => n,
            Err(e) => {
                error!(error = %e, "Directory watcher task failed");
                0
            }
        };

        let mut files_processed = 0u64;
        for (id, result) in join_all(worker_handles).await.into_iter().enumerate() {
            match result {
                Ok(n) => files_processed += n,
                Err(e) => error!(worker_id = id, error = %e, "Processing worker task failed"),
            }
        }

        let faults = match drain.await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "Fault drain task failed");
                FaultSummary::default()
            }
        };

        let summary = RunSummary {
            files_enqueued,
            files_processed,
            faults,
        };
        info!(
            files_enqueued = summary.files_enqueued,
            files_processed = summary.files_processed,
            faults = summary.faults.total(),
            "Pipeline stopped"
        );
        Ok(summary)
    }
}
