// src/store/memory.rs

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::data_model::{Record, UnitId};
use crate::error::Result;
use crate::store::RecordStore;

#[derive(Debug, Default)]
struct Inner {
    processed: HashSet<String>,
    records: Vec<Record>,
}

/// Process-local store. Nothing survives a restart, so it is meant for tests
/// and for trying the pipeline without a database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the processed set, as if a previous run had recorded these ids.
    pub fn with_processed<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let processed = ids.into_iter().map(Into::into).collect();
        MemoryStore {
            inner: RwLock::new(Inner {
                processed,
                records: Vec::new(),
            }),
        }
    }

    pub async fn record_count(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn processed_ids(&self) -> HashSet<String> {
        self.inner.read().await.processed.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn name(&self) -> &'static str {
        "MemoryStore"
    }

    async fn load_processed_file_ids(&self) -> Result<HashSet<String>> {
        Ok(self.inner.read().await.processed.clone())
    }

    async fn mark_processed(&self, file_id: &str) -> Result<()> {
        self.inner.write().await.processed.insert(file_id.to_string());
        Ok(())
    }

    async fn insert_batch(&self, records: &[Record]) -> Result<()> {
        self.inner.write().await.records.extend_from_slice(records);
        Ok(())
    }

    async fn query_by_unit(
        &self,
        unit: &UnitId,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Record>> {
        let inner = self.inner.read().await;
        let matching = inner
            .records
            .iter()
            .filter(|r| &r.unit_guid == unit)
            .skip(offset as usize);

        let found = match limit {
            Some(limit) => matching.take(limit as usize).cloned().collect(),
            None => matching.cloned().collect(),
        };
        Ok(found)
    }
}
