use thiserror::Error;

/// Custom Result type for this crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// The Error type for ingestion operations.
///
/// Fatal startup failures (`ConfigError`, `ConfigValidationError`,
/// `StoreUnavailable`) escape through the initialization paths. Everything
/// else is recoverable and ends up wrapped in a [`crate::fault::Fault`].
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Configuration validation error: {0}")]
    ConfigValidationError(String),

    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    #[error("Record store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Record store error: {0}")]
    StoreError(String),

    #[error("Malformed row: expected {expected} fields, found {found}")]
    MalformedRow { expected: usize, found: usize },

    #[error("Field '{field}' is not an integer: '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Invalid unit identifier '{value}': {reason}")]
    InvalidUnitId { value: String, reason: String },

    #[error("Report generation error: {0}")]
    ReportError(String),

    #[error("Parquet writing error: {source}")]
    ParquetError {
        #[from]
        source: parquet::errors::ParquetError,
    },

    #[error("Arrow conversion error: {source}")]
    ArrowError {
        #[from]
        source: arrow::error::ArrowError,
    },

    #[error("Ingestion queue is closed")]
    QueueClosed,

    #[error("Processing exceeded the {seconds}s deadline")]
    Timeout { seconds: u64 },

    #[error("Serialization/Deserialization error: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl PipelineError {
    /// True for errors that describe a single rejected row rather than a
    /// whole file.
    pub fn is_row_level(&self) -> bool {
        matches!(
            self,
            PipelineError::MalformedRow { .. }
                | PipelineError::InvalidNumber { .. }
                | PipelineError::InvalidUnitId { .. }
        )
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::StoreError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        PipelineError::Unexpected(format!("Task failed to complete: {}", err))
    }
}
