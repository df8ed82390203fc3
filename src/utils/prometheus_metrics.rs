// src/utils/prometheus_metrics.rs

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Gauge, Histogram,
};

// Metrics from the Directory Watcher
pub static FILES_DISCOVERED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "ingest_files_discovered_total",
        "Total number of new files enqueued by the directory watcher."
    )
    .expect("Failed to register FILES_DISCOVERED_TOTAL counter")
});

pub static QUEUE_DEPTH: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "ingest_queue_depth",
        "Number of file paths waiting in the ingestion queue."
    )
    .expect("Failed to register QUEUE_DEPTH gauge")
});

// Metrics from the Processing Workers
pub static FILES_PROCESSED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "ingest_files_processed_total",
        "Total number of files taken off the queue and processed."
    )
    .expect("Failed to register FILES_PROCESSED_TOTAL counter")
});

pub static ROWS_PARSED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "ingest_rows_parsed_total",
        "Total number of rows decoded into records."
    )
    .expect("Failed to register ROWS_PARSED_TOTAL counter")
});

pub static ROWS_REJECTED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "ingest_rows_rejected_total",
        "Total number of rows dropped by the row parser."
    )
    .expect("Failed to register ROWS_REJECTED_TOTAL counter")
});

pub static BATCHES_INSERTED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "ingest_batches_inserted_total",
        "Total number of record batches committed to the store."
    )
    .expect("Failed to register BATCHES_INSERTED_TOTAL counter")
});

pub static BATCH_INSERT_FAILURES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "ingest_batch_insert_failures_total",
        "Total number of record batches the store rejected."
    )
    .expect("Failed to register BATCH_INSERT_FAILURES_TOTAL counter")
});

pub static REPORTS_GENERATED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "ingest_reports_generated_total",
        "Total number of per-unit reports written."
    )
    .expect("Failed to register REPORTS_GENERATED_TOTAL counter")
});

pub static REPORT_FAILURES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "ingest_report_failures_total",
        "Total number of per-unit reports that failed to generate."
    )
    .expect("Failed to register REPORT_FAILURES_TOTAL counter")
});

pub static ACTIVE_WORKERS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "ingest_active_workers",
        "Number of processing workers currently running."
    )
    .expect("Failed to register ACTIVE_WORKERS gauge")
});

pub static FILE_PROCESSING_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "ingest_file_processing_duration_seconds",
        "Histogram of per-file processing latencies (read, parse, insert, report)."
    )
    .expect("Failed to register FILE_PROCESSING_DURATION_SECONDS histogram")
});

// Metrics from the Fault Reporter
pub static FAULTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ingest_faults_total",
        "Total number of recoverable faults, by pipeline stage.",
        &["stage"]
    )
    .expect("Failed to register FAULTS_TOTAL counter vec")
});
