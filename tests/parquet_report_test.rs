// tests/parquet_report_test.rs

mod common;

use std::fs::File;

use arrow::array::{Array, BinaryArray, Int64Array, StringArray};
use common::*;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tempfile::tempdir;
use TsvIngest::data_model::Record;
use TsvIngest::error::PipelineError;
use TsvIngest::pipeline::readers::{RowParser, TsvReader};
use TsvIngest::pipeline::writers::{ParquetReportWriter, ReportGenerator};

fn records(rows: &[String]) -> Vec<Record> {
    let parsed = TsvReader::new().parse(&file_content(rows));
    assert!(parsed.errors.is_empty());
    parsed.records
}

fn read_back(path: &std::path::Path) -> Vec<arrow::record_batch::RecordBatch> {
    let file = File::open(path).expect("report file should exist");
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .unwrap()
        .build()
        .unwrap();
    reader.map(|batch| batch.unwrap()).collect()
}

#[tokio::test]
async fn test_report_is_named_after_unit_and_holds_every_record() {
    let out = tempdir().unwrap();
    let writer = ParquetReportWriter::new(out.path()).unwrap();
    let mut input = records(&[row("1", GUID_A, "100"), row("2", GUID_A, "0")]);
    input[1].mqtt = b"\x00\x01payload".to_vec();

    let path = writer.generate(&unit(GUID_A), &input).await.unwrap();

    assert_eq!(path, out.path().join(format!("{}.parquet", GUID_A)));
    let batches = read_back(&path);
    let total_rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    assert_eq!(total_rows, 2);

    let batch = &batches[0];
    assert_eq!(batch.num_columns(), 15);
    let n = batch
        .column_by_name("n")
        .unwrap()
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    assert_eq!(n.value(0), 1);
    assert_eq!(n.value(1), 2);

    let guid = batch
        .column_by_name("unit_guid")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(guid.value(0), GUID_A);

    let text = batch
        .column_by_name("text")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(text.value(0), "Разморозка");

    let mqtt = batch
        .column_by_name("mqtt")
        .unwrap()
        .as_any()
        .downcast_ref::<BinaryArray>()
        .unwrap();
    assert_eq!(mqtt.value(1), b"\x00\x01payload");
    assert!(batch.column_by_name("type").is_some());
}

#[tokio::test]
async fn test_regenerating_replaces_previous_report() {
    let out = tempdir().unwrap();
    let writer = ParquetReportWriter::new(out.path()).unwrap();

    writer
        .generate(&unit(GUID_B), &records(&[row("1", GUID_B, "1")]))
        .await
        .unwrap();
    let path = writer
        .generate(
            &unit(GUID_B),
            &records(&[row("1", GUID_B, "1"), row("2", GUID_B, "1"), row("3", GUID_B, "1")]),
        )
        .await
        .unwrap();

    let total_rows: usize = read_back(&path).iter().map(|b| b.num_rows()).sum();
    assert_eq!(total_rows, 3);

    // No temporary files are left behind.
    let leftovers: Vec<_> = std::fs::read_dir(out.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(leftovers, vec![format!("{}.parquet", GUID_B)]);
}

#[tokio::test]
async fn test_report_footer_carries_unit_id() {
    let out = tempdir().unwrap();
    let writer = ParquetReportWriter::new(out.path()).unwrap();
    let path = writer
        .generate(&unit(GUID_C), &records(&[row("1", GUID_C, "1")]))
        .await
        .unwrap();

    let file = File::open(&path).unwrap();
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
    let key_values = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .cloned()
        .unwrap_or_default();
    let unit_kv = key_values
        .iter()
        .find(|kv| kv.key == "unit_guid")
        .expect("unit_guid metadata");
    assert_eq!(unit_kv.value.as_deref(), Some(GUID_C));
}

#[tokio::test]
async fn test_empty_record_set_is_an_error() {
    let out = tempdir().unwrap();
    let writer = ParquetReportWriter::new(out.path()).unwrap();

    let result = writer.generate(&unit(GUID_A), &[]).await;
    assert!(matches!(result, Err(PipelineError::ReportError(_))));
    assert!(!writer.report_path(&unit(GUID_A)).exists());
}

#[test]
fn test_output_directory_is_created() {
    let out = tempdir().unwrap();
    let nested = out.path().join("reports").join("daily");
    ParquetReportWriter::new(&nested).unwrap();
    assert!(nested.is_dir());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_generates_for_one_unit_all_succeed() {
    let out = tempdir().unwrap();
    let writer = ParquetReportWriter::new(out.path()).unwrap();
    let small = records(
        &(1..=2_000)
            .map(|n| row(&n.to_string(), GUID_A, "1"))
            .collect::<Vec<_>>(),
    );
    let large = records(
        &(1..=5_000)
            .map(|n| row(&n.to_string(), GUID_A, "1"))
            .collect::<Vec<_>>(),
    );

    for _ in 0..10 {
        let unit_first = unit(GUID_A);
        let unit_second = unit(GUID_A);
        let (first, second) = tokio::join!(
            writer.generate(&unit_first, &small),
            writer.generate(&unit_second, &large),
        );
        let first = first.unwrap();
        let second = second.unwrap();
        assert_eq!(first, second);

        // Whichever write landed last, the published file is complete.
        let total_rows: usize = read_back(&first).iter().map(|b| b.num_rows()).sum();
        assert!(total_rows == small.len() || total_rows == large.len());
    }

    let leftovers: Vec<_> = std::fs::read_dir(out.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(leftovers, vec![format!("{}.parquet", GUID_A)]);
}

#[tokio::test]
async fn test_failed_write_leaves_no_temporary_file() {
    let out = tempdir().unwrap();
    let writer = ParquetReportWriter::new(out.path()).unwrap();
    // A directory in the report's place makes the final rename fail.
    std::fs::create_dir(writer.report_path(&unit(GUID_A))).unwrap();

    let result = writer
        .generate(&unit(GUID_A), &records(&[row("1", GUID_A, "1")]))
        .await;

    assert!(result.is_err());
    let names: Vec<_> = std::fs::read_dir(out.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names, vec![format!("{}.parquet", GUID_A)]);
    assert!(writer.report_path(&unit(GUID_A)).is_dir());
}
