// tests/common/mod.rs
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use TsvIngest::data_model::{Record, UnitId};
use TsvIngest::error::{PipelineError, Result};
use TsvIngest::fault::{Fault, FaultReporter};
use TsvIngest::pipeline::readers::TsvReader;
use TsvIngest::pipeline::writers::ReportGenerator;
use TsvIngest::store::{MemoryStore, RecordStore};
use TsvIngest::worker_logic::{UnitLocks, WorkerContext};

pub const GUID_A: &str = "01749246-95f6-57db-b7c3-2ae0e8be671f";
pub const GUID_B: &str = "01749246-9617-585e-9e19-157ccad64ee6";
pub const GUID_C: &str = "0174923a-c9c1-5a3b-8a51-9d5c0fdb4f7e";

/// One well-formed row of the ingest format.
pub fn row(n: &str, guid: &str, level: &str) -> String {
    [
        n,
        "",
        "G-044322",
        guid,
        "cold7_Defrost_status",
        "Разморозка",
        "",
        "waiting",
        level,
        "LOCAL",
        "cold7_status.Defrost_status",
        "",
        "",
        "",
        "",
    ]
    .join("\t")
}

pub fn file_content(rows: &[String]) -> String {
    let mut content = rows.join("\n");
    content.push('\n');
    content
}

pub fn write_file(dir: &Path, name: &str, rows: &[String]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, file_content(rows)).expect("Failed to write test file");
    path
}

pub fn unit(s: &str) -> UnitId {
    s.parse().expect("valid unit id")
}

/// Records every `generate` call and can be told to fail for given units.
#[derive(Default)]
pub struct RecordingReports {
    calls: Mutex<Vec<(UnitId, usize)>>,
    fail_for: HashSet<UnitId>,
}

impl RecordingReports {
    pub fn failing_for(units: &[UnitId]) -> Self {
        RecordingReports {
            calls: Mutex::new(Vec::new()),
            fail_for: units.iter().copied().collect(),
        }
    }

    /// (unit, number of records handed over) in call order.
    pub fn calls(&self) -> Vec<(UnitId, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportGenerator for RecordingReports {
    fn name(&self) -> &'static str {
        "RecordingReports"
    }

    async fn generate(&self, unit: &UnitId, records: &[Record]) -> Result<PathBuf> {
        self.calls.lock().unwrap().push((*unit, records.len()));
        if self.fail_for.contains(unit) {
            return Err(PipelineError::ReportError(format!("refusing {}", unit)));
        }
        Ok(PathBuf::from(format!("/reports/{}.parquet", unit)))
    }
}

/// Memory store whose first `failing_inserts` batch inserts fail, and whose
/// processed-set operations can be switched off.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub failing_inserts: AtomicUsize,
    pub fail_load: bool,
    pub fail_mark: bool,
}

impl FlakyStore {
    pub fn failing_inserts(n: usize) -> Self {
        FlakyStore {
            failing_inserts: AtomicUsize::new(n),
            ..Default::default()
        }
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    fn name(&self) -> &'static str {
        "FlakyStore"
    }

    async fn load_processed_file_ids(&self) -> Result<HashSet<String>> {
        if self.fail_load {
            return Err(PipelineError::StoreUnavailable("connection refused".into()));
        }
        self.inner.load_processed_file_ids().await
    }

    async fn mark_processed(&self, file_id: &str) -> Result<()> {
        if self.fail_mark {
            return Err(PipelineError::StoreError("files table is read-only".into()));
        }
        self.inner.mark_processed(file_id).await
    }

    async fn insert_batch(&self, records: &[Record]) -> Result<()> {
        let remaining = self.failing_inserts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_inserts.store(remaining - 1, Ordering::SeqCst);
            return Err(PipelineError::StoreError("insert rejected".into()));
        }
        self.inner.insert_batch(records).await
    }

    async fn query_by_unit(
        &self,
        unit: &UnitId,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Record>> {
        self.inner.query_by_unit(unit, offset, limit).await
    }
}

/// Memory store whose first insert stalls for `first_insert_delay` before
/// writing anything.
pub struct StallingStore {
    pub inner: MemoryStore,
    pub first_insert_delay: Duration,
    inserts: AtomicUsize,
}

impl StallingStore {
    pub fn new(first_insert_delay: Duration) -> Self {
        StallingStore {
            inner: MemoryStore::new(),
            first_insert_delay,
            inserts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RecordStore for StallingStore {
    fn name(&self) -> &'static str {
        "StallingStore"
    }

    async fn load_processed_file_ids(&self) -> Result<HashSet<String>> {
        self.inner.load_processed_file_ids().await
    }

    async fn mark_processed(&self, file_id: &str) -> Result<()> {
        self.inner.mark_processed(file_id).await
    }

    async fn insert_batch(&self, records: &[Record]) -> Result<()> {
        if self.inserts.fetch_add(1, Ordering::SeqCst) == 0 {
            tokio::time::sleep(self.first_insert_delay).await;
        }
        self.inner.insert_batch(records).await
    }

    async fn query_by_unit(
        &self,
        unit: &UnitId,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Record>> {
        self.inner.query_by_unit(unit, offset, limit).await
    }
}

/// Report generator that takes `delay` per call and remembers the highest
/// number of calls it saw running at once for a single unit.
#[derive(Default)]
pub struct OverlapTrackingReports {
    pub delay: Duration,
    in_flight: Mutex<HashMap<UnitId, usize>>,
    max_overlap: AtomicUsize,
    finished: Mutex<Vec<(UnitId, usize)>>,
}

impl OverlapTrackingReports {
    pub fn with_delay(delay: Duration) -> Self {
        OverlapTrackingReports {
            delay,
            ..Default::default()
        }
    }

    pub fn max_overlap(&self) -> usize {
        self.max_overlap.load(Ordering::SeqCst)
    }

    /// (unit, number of records) in the order the calls completed.
    pub fn finished(&self) -> Vec<(UnitId, usize)> {
        self.finished.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportGenerator for OverlapTrackingReports {
    fn name(&self) -> &'static str {
        "OverlapTrackingReports"
    }

    async fn generate(&self, unit: &UnitId, records: &[Record]) -> Result<PathBuf> {
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            let running = in_flight.entry(*unit).or_insert(0);
            *running += 1;
            self.max_overlap.fetch_max(*running, Ordering::SeqCst);
        }
        tokio::time::sleep(self.delay).await;
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            if let Some(running) = in_flight.get_mut(unit) {
                *running -= 1;
            }
        }
        self.finished.lock().unwrap().push((*unit, records.len()));
        Ok(PathBuf::from(format!("/reports/{}.parquet", unit)))
    }
}

pub fn worker_context(
    store: Arc<dyn RecordStore>,
    reports: Arc<dyn ReportGenerator>,
) -> (WorkerContext, mpsc::UnboundedReceiver<Fault>) {
    let (faults, rx) = FaultReporter::channel();
    let ctx = WorkerContext {
        store,
        reports,
        parser: Arc::new(TsvReader::new()),
        faults,
        file_timeout: None,
        unit_locks: Arc::new(UnitLocks::default()),
    };
    (ctx, rx)
}

/// Everything reported so far, without waiting for senders to go away.
pub fn collect_faults(rx: &mut mpsc::UnboundedReceiver<Fault>) -> Vec<Fault> {
    let mut faults = Vec::new();
    while let Ok(fault) = rx.try_recv() {
        faults.push(fault);
    }
    faults
}
