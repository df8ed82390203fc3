use std::path::PathBuf;

use clap::Parser;

use crate::config::ingest::{IngestConfig, PostgresParams, ServerConfig, StoreConfig};

// Define command-line arguments
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the ingest configuration YAML file.
    #[arg(short = 'c', long, default_value = "config/ingest.yaml")]
    pub config: PathBuf,

    /// Directory to watch for new files
    #[arg(long, env = "FILES_DIRECTORY")]
    pub watch_dir: Option<PathBuf>,

    /// Delay between directory polls, in milliseconds
    #[arg(long, env = "CHECK_FILES_DIRECTORY_DELAY")]
    pub poll_interval_ms: Option<u64>,

    /// Maximum number of discovered files waiting for a worker
    #[arg(long, env = "QUEUE_MAX_SIZE")]
    pub queue_capacity: Option<usize>,

    /// Number of concurrent processing workers
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Directory report artifacts are written to
    #[arg(long, env = "OUT_FILE_DIRECTORY")]
    pub report_dir: Option<PathBuf>,

    /// PostgreSQL connection string; selects the postgres store
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Port for the query/metrics HTTP server; enables the server
    #[arg(long, env = "SERVICE_PORT")]
    pub server_port: Option<u16>,

    /// Rows per page for the query server
    #[arg(long, env = "SERVICE_PAGE_SIZE")]
    pub page_size: Option<u64>,

    /// Validate the configuration and exit
    #[arg(long)]
    pub validate_config: bool,
}

impl Args {
    /// Applies command-line and environment overrides on top of the YAML.
    pub fn apply_overrides(&self, config: &mut IngestConfig) {
        if let Some(dir) = &self.watch_dir {
            config.watch.directory = dir.clone();
        }
        if let Some(ms) = self.poll_interval_ms {
            config.watch.poll_interval_ms = ms;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue.capacity = capacity;
        }
        if let Some(count) = self.workers {
            config.workers.count = count;
        }
        if let Some(dir) = &self.report_dir {
            config.reports.output_directory = dir.clone();
        }
        if let Some(url) = &self.database_url {
            config.store = match &config.store {
                StoreConfig::Postgres(params) => StoreConfig::Postgres(PostgresParams {
                    url: url.clone(),
                    max_connections: params.max_connections,
                }),
                StoreConfig::Memory => StoreConfig::Postgres(PostgresParams::new(url.clone())),
            };
        }
        if self.server_port.is_some() || self.page_size.is_some() {
            let server = config.server.get_or_insert_with(ServerConfig::default);
            if let Some(port) = self.server_port {
                server.port = port;
            }
            if let Some(page_size) = self.page_size {
                server.page_size = page_size;
            }
        }
    }
}
