use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{PipelineError, Result};

/// Represents the ingestion service configuration read from YAML.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub watch: WatchConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub store: StoreConfig,
    pub reports: ReportsConfig,
    #[serde(default)]
    pub server: Option<ServerConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct WatchConfig {
    pub directory: PathBuf,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct QueueConfig {
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            capacity: default_queue_capacity(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct WorkersConfig {
    #[serde(default = "default_worker_count")]
    pub count: usize,
    /// Per-file processing deadline. Unset means no deadline.
    #[serde(default)]
    pub file_timeout_secs: Option<u64>,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        WorkersConfig {
            count: default_worker_count(),
            file_timeout_secs: None,
        }
    }
}

impl WorkersConfig {
    pub fn file_timeout(&self) -> Option<Duration> {
        self.file_timeout_secs.map(Duration::from_secs)
    }
}

/// Record store backend. The `type` field in YAML selects the variant.
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    #[default]
    Memory,
    Postgres(PostgresParams),
}

impl StoreConfig {
    pub fn name(&self) -> &'static str {
        match self {
            StoreConfig::Memory => "memory",
            StoreConfig::Postgres(_) => "postgres",
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct PostgresParams {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl PostgresParams {
    pub fn new(url: impl Into<String>) -> Self {
        PostgresParams {
            url: url.into(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ReportsConfig {
    pub output_directory: PathBuf,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: default_server_port(),
            page_size: default_page_size(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// When set, logs also go to a daily rolling file in this directory.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_queue_capacity() -> usize {
    64
}

fn default_worker_count() -> usize {
    1
}

fn default_max_connections() -> u32 {
    5
}

fn default_server_port() -> u16 {
    8080
}

fn default_page_size() -> u64 {
    100
}

impl IngestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.watch.directory.as_os_str().is_empty() {
            return Err(PipelineError::ConfigValidationError(
                "watch.directory must not be empty".to_string(),
            ));
        }
        if self.watch.poll_interval_ms == 0 {
            return Err(PipelineError::ConfigValidationError(
                "watch.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.queue.capacity == 0 {
            return Err(PipelineError::ConfigValidationError(
                "queue.capacity must be greater than 0".to_string(),
            ));
        }
        if self.workers.count == 0 {
            return Err(PipelineError::ConfigValidationError(
                "workers.count must be greater than 0".to_string(),
            ));
        }
        if self.workers.file_timeout_secs == Some(0) {
            return Err(PipelineError::ConfigValidationError(
                "workers.file_timeout_secs must be greater than 0 when set".to_string(),
            ));
        }
        if let StoreConfig::Postgres(params) = &self.store {
            if params.url.trim().is_empty() {
                return Err(PipelineError::ConfigValidationError(
                    "store.url must not be empty".to_string(),
                ));
            }
            if params.max_connections == 0 {
                return Err(PipelineError::ConfigValidationError(
                    "store.max_connections must be greater than 0".to_string(),
                ));
            }
        }
        if self.reports.output_directory.as_os_str().is_empty() {
            return Err(PipelineError::ConfigValidationError(
                "reports.output_directory must not be empty".to_string(),
            ));
        }
        if let Some(server) = &self.server {
            if server.page_size == 0 {
                return Err(PipelineError::ConfigValidationError(
                    "server.page_size must be greater than 0".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Loads the ingestion configuration from a YAML file.
pub fn load_ingest_config<P: AsRef<Path>>(config_path: P) -> Result<IngestConfig> {
    let path_ref = config_path.as_ref();
    let config_content = fs::read_to_string(path_ref).map_err(|e| {
        PipelineError::ConfigError(format!(
            "Failed to read ingest config file '{}': {}",
            path_ref.display(),
            e
        ))
    })?;

    let config: IngestConfig = serde_yaml::from_str(&config_content).map_err(|e| {
        PipelineError::ConfigError(format!(
            "Failed to parse ingest config YAML from '{}': {}",
            path_ref.display(),
            e
        ))
    })?;

    Ok(config)
}
