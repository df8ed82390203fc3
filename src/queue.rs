// src/queue.rs

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::data_model::FileTask;
use crate::error::{PipelineError, Result};

/// Bounded FIFO of discovered files, shared by one watcher and many workers.
///
/// `enqueue` waits while the queue is full. `dequeue` waits while it is
/// empty. After [`IngestionQueue::close`] both return promptly: enqueue with
/// `QueueClosed`, dequeue with `None`. Paths still buffered at that point are
/// not handed out.
#[derive(Debug, Clone)]
pub struct IngestionQueue {
    tx: mpsc::Sender<FileTask>,
    rx: Arc<Mutex<mpsc::Receiver<FileTask>>>,
    closed: CancellationToken,
}

impl IngestionQueue {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(PipelineError::ConfigValidationError(
                "Queue capacity must be at least 1".to_string(),
            ));
        }
        let (tx, rx) = mpsc::channel(capacity);
        Ok(IngestionQueue {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            closed: CancellationToken::new(),
        })
    }

    pub async fn enqueue(&self, task: FileTask) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(PipelineError::QueueClosed),
            sent = self.tx.send(task) => sent.map_err(|_| PipelineError::QueueClosed),
        }
    }

    /// Next task in FIFO order, or `None` once the queue is closed.
    pub async fn dequeue(&self) -> Option<FileTask> {
        if self.closed.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            task = async {
                let mut rx = self.rx.lock().await;
                rx.recv().await
            } => task,
        }
    }

    /// Idempotent.
    pub fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();

        let abandoned = self.len();
        if abandoned > 0 {
            warn!(abandoned, "Queue closed with unprocessed paths");
        } else {
            debug!("Queue closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Number of buffered tasks.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}
