// src/store/mod.rs

use std::collections::HashSet;

use async_trait::async_trait;

use crate::data_model::{Record, UnitId};
use crate::error::Result;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Durable storage for ingested records and for the set of files already
/// handed to the pipeline.
///
/// Implementations must be safe to share between the watcher, every worker
/// and the query server.
#[async_trait]
pub trait RecordStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Every file identifier recorded so far. Called once at watcher start.
    async fn load_processed_file_ids(&self) -> Result<HashSet<String>>;

    /// Records that `file_id` has been queued. Recording an id twice is not
    /// an error.
    async fn mark_processed(&self, file_id: &str) -> Result<()>;

    /// Persists the whole batch or none of it.
    async fn insert_batch(&self, records: &[Record]) -> Result<()>;

    /// Records for `unit` in insertion order, skipping `offset` rows and
    /// returning at most `limit` rows (all remaining rows when `None`).
    async fn query_by_unit(
        &self,
        unit: &UnitId,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Record>>;
}
