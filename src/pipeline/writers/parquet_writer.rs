use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, BinaryBuilder, Int64Builder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use tracing::debug;

use crate::data_model::{Record, UnitId};
use crate::error::{PipelineError, Result};
use crate::pipeline::writers::{BaseWriter, ReportGenerator};

/// Column layout of a report; mirrors the ingest format.
pub fn create_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("n", DataType::Int64, false),
        Field::new("mqtt", DataType::Binary, false),
        Field::new("invid", DataType::Utf8, false),
        Field::new("unit_guid", DataType::Utf8, false),
        Field::new("msg_id", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("context", DataType::Binary, false),
        Field::new("class", DataType::Utf8, false),
        Field::new("level", DataType::Int64, false),
        Field::new("area", DataType::Utf8, false),
        Field::new("addr", DataType::Utf8, false),
        Field::new("block", DataType::Utf8, false),
        Field::new("type", DataType::Utf8, false),
        Field::new("bit", DataType::Int64, false),
        Field::new("invert_bit", DataType::Int64, false),
    ]))
}

/// Writes Records to a Parquet file.
pub struct ParquetWriter {
    schema: SchemaRef,
    writer: Option<ArrowWriter<File>>,
}

impl ParquetWriter {
    /// Writes into `file` and stamps `metadata` into the file footer.
    pub fn with_metadata(file: File, metadata: Vec<(String, String)>) -> Result<Self> {
        let schema = create_schema();
        let key_values = metadata
            .into_iter()
            .map(|(k, v)| KeyValue::new(k, v))
            .collect::<Vec<_>>();
        let props = WriterProperties::builder()
            .set_key_value_metadata(Some(key_values))
            .build();
        let writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;

        Ok(ParquetWriter {
            schema,
            writer: Some(writer),
        })
    }
}

impl BaseWriter for ParquetWriter {
    fn write_batch(&mut self, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut n_builder = Int64Builder::with_capacity(records.len());
        let mut mqtt_builder = BinaryBuilder::new();
        let mut invid_builder = StringBuilder::new();
        let mut unit_builder = StringBuilder::new();
        let mut msg_id_builder = StringBuilder::new();
        let mut text_builder = StringBuilder::new();
        let mut context_builder = BinaryBuilder::new();
        let mut class_builder = StringBuilder::new();
        let mut level_builder = Int64Builder::with_capacity(records.len());
        let mut area_builder = StringBuilder::new();
        let mut addr_builder = StringBuilder::new();
        let mut block_builder = StringBuilder::new();
        let mut type_builder = StringBuilder::new();
        let mut bit_builder = Int64Builder::with_capacity(records.len());
        let mut invert_bit_builder = Int64Builder::with_capacity(records.len());

        for record in records {
            n_builder.append_value(record.n);
            mqtt_builder.append_value(&record.mqtt);
            invid_builder.append_value(&record.invid);
            unit_builder.append_value(record.unit_guid.to_string());
            msg_id_builder.append_value(&record.msg_id);
            text_builder.append_value(&record.text);
            context_builder.append_value(&record.context);
            class_builder.append_value(&record.class);
            level_builder.append_value(record.level);
            area_builder.append_value(&record.area);
            addr_builder.append_value(&record.addr);
            block_builder.append_value(&record.block);
            type_builder.append_value(&record.kind);
            bit_builder.append_value(record.bit);
            invert_bit_builder.append_value(record.invert_bit);
        }

        let columns: Vec<ArrayRef> = vec![
            Arc::new(n_builder.finish()),
            Arc::new(mqtt_builder.finish()),
            Arc::new(invid_builder.finish()),
            Arc::new(unit_builder.finish()),
            Arc::new(msg_id_builder.finish()),
            Arc::new(text_builder.finish()),
            Arc::new(context_builder.finish()),
            Arc::new(class_builder.finish()),
            Arc::new(level_builder.finish()),
            Arc::new(area_builder.finish()),
            Arc::new(addr_builder.finish()),
            Arc::new(block_builder.finish()),
            Arc::new(type_builder.finish()),
            Arc::new(bit_builder.finish()),
            Arc::new(invert_bit_builder.finish()),
        ];

        let batch = RecordBatch::try_new(self.schema.clone(), columns)?;

        if let Some(writer) = self.writer.as_mut() {
            writer.write(&batch)?;
        }

        Ok(())
    }

    fn close(mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.close()?;
        }
        Ok(())
    }
}

/// Report generator that writes `<unit_guid>.parquet` into a directory.
///
/// Each write goes to its own temporary file in the output directory and is
/// renamed into place, so a reader sees either the previous report or the new
/// one. A failed write leaves nothing behind.
#[derive(Debug, Clone)]
pub struct ParquetReportWriter {
    output_dir: PathBuf,
}

impl ParquetReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir).map_err(|e| {
            PipelineError::ConfigError(format!(
                "Failed to create report directory '{}': {}",
                output_dir.display(),
                e
            ))
        })?;
        Ok(ParquetReportWriter { output_dir })
    }

    pub fn report_path(&self, unit: &UnitId) -> PathBuf {
        self.output_dir.join(format!("{}.parquet", unit))
    }
}

fn write_report(
    output_dir: &Path,
    final_path: &Path,
    unit: &UnitId,
    records: &[Record],
) -> Result<()> {
    let tmp = tempfile::Builder::new()
        .prefix(&format!(".{}.", unit))
        .suffix(".parquet.tmp")
        .tempfile_in(output_dir)?;
    let metadata = vec![
        ("unit_guid".to_string(), unit.to_string()),
        ("generated_at".to_string(), chrono::Utc::now().to_rfc3339()),
    ];

    // `tmp` deletes the file on drop unless it is persisted.
    let mut writer = ParquetWriter::with_metadata(tmp.reopen()?, metadata)?;
    writer.write_batch(records)?;
    writer.close()?;

    tmp.persist(final_path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl ReportGenerator for ParquetReportWriter {
    fn name(&self) -> &'static str {
        "ParquetReportWriter"
    }

    async fn generate(&self, unit: &UnitId, records: &[Record]) -> Result<PathBuf> {
        if records.is_empty() {
            return Err(PipelineError::ReportError(format!(
                "No records to report for unit {}",
                unit
            )));
        }

        let path = self.report_path(unit);
        let unit = *unit;
        let records = records.to_vec();
        let target = path.clone();
        let output_dir = self.output_dir.clone();
        tokio::task::spawn_blocking(move || write_report(&output_dir, &target, &unit, &records))
            .await??;

        debug!(unit = %unit, path = %path.display(), "Report written");
        Ok(path)
    }
}
