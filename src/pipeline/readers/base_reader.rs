use crate::data_model::Record;
use crate::error::PipelineError;

/// A row that could not be turned into a [`Record`].
#[derive(Debug)]
pub struct RowError {
    /// Zero-based line number within the file.
    pub row: usize,
    /// The raw row, fields re-joined with tabs.
    pub input: String,
    pub error: PipelineError,
}

/// Everything the parser got out of one file.
#[derive(Debug, Default)]
pub struct ParsedFile {
    pub records: Vec<Record>,
    pub errors: Vec<RowError>,
}

/// Turns the raw contents of one ingest file into records plus per-row errors.
///
/// Implementations must be pure: the same content always yields the same
/// output, and a bad row never aborts the rest of the file.
pub trait RowParser: Send + Sync {
    fn parse(&self, content: &str) -> ParsedFile;
}
