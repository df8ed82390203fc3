// src/config.rs

pub mod args;
pub mod ingest;

pub use args::Args;
pub use ingest::{load_ingest_config, IngestConfig};
