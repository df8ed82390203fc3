// src/watcher_logic.rs

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::data_model::FileTask;
use crate::error::{PipelineError, Result};
use crate::fault::{Fault, FaultReporter, Stage};
use crate::queue::IngestionQueue;
use crate::store::RecordStore;
use crate::utils::prometheus_metrics::{FILES_DISCOVERED_TOTAL, QUEUE_DEPTH};

/// Polls one directory and feeds unseen files into the ingestion queue.
///
/// Discovery is at-most-once: a path is recorded as processed as soon as it
/// is enqueued, before a worker has read it. A file that later fails to
/// parse or persist is not picked up again.
///
/// The in-memory processed set lives only here. It grows with every
/// discovered file and is never pruned.
pub struct DirectoryWatcher {
    directory: PathBuf,
    poll_interval: Duration,
    queue: IngestionQueue,
    store: Arc<dyn RecordStore>,
    faults: FaultReporter,
    processed: HashSet<String>,
    enqueued_total: u64,
}

impl DirectoryWatcher {
    /// Loads the processed set from the store. An unreachable store is fatal.
    #[instrument(name = "watcher_initialize", skip_all, fields(store = store.name()))]
    pub async fn initialize(
        directory: impl AsRef<Path>,
        poll_interval: Duration,
        queue: IngestionQueue,
        store: Arc<dyn RecordStore>,
        faults: FaultReporter,
    ) -> Result<Self> {
        let directory = directory.as_ref();
        let directory = std::path::absolute(directory).unwrap_or_else(|_| directory.to_path_buf());

        let processed = store
            .load_processed_file_ids()
            .await
            .map_err(|e| match e {
                PipelineError::StoreUnavailable(_) => e,
                other => PipelineError::StoreUnavailable(other.to_string()),
            })?;

        info!(known_files = processed.len(), "Loaded processed file set");

        Ok(DirectoryWatcher {
            directory,
            poll_interval,
            queue,
            store,
            faults,
            processed,
            enqueued_total: 0,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn known_files(&self) -> usize {
        self.processed.len()
    }

    /// One pass over the directory. Returns how many files were enqueued.
    ///
    /// A listing failure is reported as a fault and yields `Ok`; the next
    /// poll retries. Only a closed queue is returned as an error.
    pub async fn poll_once(&mut self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) => {
                self.faults
                    .report(Fault::new(Stage::Watcher, e.into()).with_path(&self.directory));
                return Ok(0);
            }
        };

        let mut enqueued = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    self.faults
                        .report(Fault::new(Stage::Watcher, e.into()).with_path(&self.directory));
                    break;
                }
            };

            let path = entry.path();
            let task = FileTask::new(path);
            let file_id = task.id();
            if self.processed.contains(&file_id) {
                continue;
            }

            // Follows symlinks; anything that is not a regular file is skipped.
            match tokio::fs::metadata(task.path()).await {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => continue,
                Err(e) => {
                    debug!(path = %file_id, error = %e, "Entry vanished before it could be inspected");
                    continue;
                }
            }

            self.queue.enqueue(task).await?;
            FILES_DISCOVERED_TOTAL.inc();
            QUEUE_DEPTH.set(self.queue.len() as f64);
            enqueued += 1;
            self.enqueued_total += 1;

            if let Err(e) = self.store.mark_processed(&file_id).await {
                self.faults
                    .report(Fault::new(Stage::Store, e).with_path(&file_id));
            }
            debug!(path = %file_id, "Enqueued new file");
            self.processed.insert(file_id);
        }

        Ok(enqueued)
    }

    /// Polls until `shutdown` fires or the queue is closed. Returns the number
    /// of files enqueued over the watcher's lifetime.
    pub async fn run(mut self, shutdown: CancellationToken) -> u64 {
        info!(
            directory = %self.directory.display(),
            interval_ms = self.poll_interval.as_millis() as u64,
            "Directory watcher started"
        );
        while !shutdown.is_cancelled() {
            match self.poll_once().await {
                Ok(n) => {
                    if n > 0 {
                        info!(new_files = n, "Poll complete");
                    }
                }
                Err(PipelineError::QueueClosed) => {
                    debug!("Queue closed during poll");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Unexpected poll failure");
                    self.faults.report(Fault::new(Stage::Watcher, e));
                }
            }

            if shutdown
                .run_until_cancelled(tokio::time::sleep(self.poll_interval))
                .await
                .is_none()
            {
                break;
            }
        }

        info!(files_enqueued = self.enqueued_total, "Directory watcher stopped");
        self.enqueued_total
    }
}
