#![allow(non_snake_case)]

// Declare the modules that form the library's public API
pub mod config;
pub mod data_model;
pub mod error;
pub mod executor;
pub mod fault;
pub mod pipeline;
pub mod queue;
pub mod server;
pub mod store;
pub mod utils;
pub mod watcher_logic;
pub mod worker_logic;

pub use error::{PipelineError, Result};
