use std::path::PathBuf;

use async_trait::async_trait;

use crate::data_model::{Record, UnitId};
use crate::error::Result;

/// Trait for writing batches of Records to an output sink (e.g. file).
pub trait BaseWriter {
    /// Write a batch of records to the sink.
    fn write_batch(&mut self, records: &[Record]) -> Result<()>;

    /// Finalize and close the output writer.
    fn close(self) -> Result<()>;
}

/// Produces the per-unit report artifact.
///
/// `records` is the complete set of rows the store holds for `unit`, not just
/// the rows of the file that triggered the report.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Writes one artifact named after `unit` and returns where it went.
    async fn generate(&self, unit: &UnitId, records: &[Record]) -> Result<PathBuf>;
}
