// src/pipeline/readers/mod.rs

pub mod base_reader;
pub mod tsv_reader;

pub use base_reader::{ParsedFile, RowError, RowParser};
pub use tsv_reader::{TsvReader, FIELD_COUNT};
