// src/bin/tsv_ingest.rs

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use TsvIngest::config::ingest::StoreConfig;
use TsvIngest::config::{load_ingest_config, Args};
use TsvIngest::executor::PipelineExecutor;
use TsvIngest::pipeline::writers::{ParquetReportWriter, ReportGenerator};
use TsvIngest::server::{run_server, AppState};
use TsvIngest::store::{MemoryStore, PgStore, RecordStore};
use TsvIngest::utils::{cancel_on_signal, init_logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = load_ingest_config(&args.config)?;
    args.apply_overrides(&mut config);
    config
        .validate()
        .with_context(|| format!("Invalid configuration in '{}'", args.config.display()))?;

    if args.validate_config {
        println!("Configuration '{}' is valid.", args.config.display());
        return Ok(());
    }

    // Held for the lifetime of the process so buffered file logs get flushed.
    let _log_guard = init_logging(&config.logging)?;

    info!(
        watch_dir = %config.watch.directory.display(),
        report_dir = %config.reports.output_directory.display(),
        store = config.store.name(),
        workers = config.workers.count,
        "Starting tsv-ingest"
    );

    let store: Arc<dyn RecordStore> = match &config.store {
        StoreConfig::Memory => {
            warn!("Using the in-memory record store; processed files and records are lost on exit");
            Arc::new(MemoryStore::new())
        }
        StoreConfig::Postgres(params) => {
            let store = PgStore::connect(&params.url, params.max_connections)
                .await
                .context("Record store is unreachable")?;
            store.ensure_schema().await.context("Failed to prepare database schema")?;
            Arc::new(store)
        }
    };

    let reports: Arc<dyn ReportGenerator> =
        Arc::new(ParquetReportWriter::new(&config.reports.output_directory)?);

    let shutdown = CancellationToken::new();
    let signal_handle = cancel_on_signal(shutdown.clone());

    let server_handle = config.server.as_ref().map(|server| {
        let state = AppState {
            store: Arc::clone(&store),
            page_size: server.page_size,
        };
        let port = server.port;
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = run_server(port, state, token.clone()).await {
                error!(port, error = %e, "Query server failed; shutting down");
                token.cancel();
            }
        })
    });

    let executor = PipelineExecutor::new(config, store, reports);
    let result = executor.run(shutdown.clone()).await;

    // Startup failures return before shutdown fires; stop the other tasks too.
    shutdown.cancel();
    if let Some(handle) = server_handle {
        if let Err(e) = handle.await {
            error!(error = %e, "Query server task failed");
        }
    }
    if let Err(e) = signal_handle.await {
        error!(error = %e, "Signal handler task failed");
    }

    let summary = result.context("Pipeline failed to start")?;
    info!(
        files_enqueued = summary.files_enqueued,
        files_processed = summary.files_processed,
        faults = summary.faults.total(),
        "tsv-ingest stopped"
    );
    Ok(())
}
