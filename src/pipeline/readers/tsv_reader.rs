// src/pipeline/readers/tsv_reader.rs

use csv::{ReaderBuilder, StringRecord};
use itertools::Itertools;
use tracing::trace;

use crate::data_model::{Record, UnitId};
use crate::error::{PipelineError, Result};
use crate::pipeline::readers::{ParsedFile, RowError, RowParser};

/// Number of tab-separated fields in every well-formed row.
pub const FIELD_COUNT: usize = 15;

/// Parses the tab-delimited ingest format.
///
/// Rows are split on line boundaries and then on tabs. No quoting is
/// recognised: a `"` is just another character. Blank lines are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct TsvReader;

impl TsvReader {
    pub fn new() -> Self {
        TsvReader
    }
}

impl RowParser for TsvReader {
    fn parse(&self, content: &str) -> ParsedFile {
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .from_reader(content.as_bytes());

        let mut parsed = ParsedFile::default();

        for result in reader.records() {
            match result {
                Ok(row) => {
                    let index = row_index(row.position().map(|p| p.line()));
                    match decode_row(&row) {
                        Ok(record) => parsed.records.push(record),
                        Err(error) => {
                            trace!(row = index, error = %error, "Rejected row");
                            parsed.errors.push(RowError {
                                row: index,
                                input: row.iter().join("\t"),
                                error,
                            });
                        }
                    }
                }
                Err(e) => {
                    let index = row_index(e.position().map(|p| p.line()));
                    parsed.errors.push(RowError {
                        row: index,
                        input: String::new(),
                        error: PipelineError::Unexpected(format!("Row could not be split: {}", e)),
                    });
                }
            }
        }

        parsed
    }
}

fn row_index(line: Option<u64>) -> usize {
    line.map(|l| l.saturating_sub(1) as usize).unwrap_or_default()
}

/// Decodes one row in column order. The first failing field decides the
/// error for the row.
fn decode_row(row: &StringRecord) -> Result<Record> {
    if row.len() != FIELD_COUNT {
        return Err(PipelineError::MalformedRow {
            expected: FIELD_COUNT,
            found: row.len(),
        });
    }

    let n = read_int("n", &row[0])?;
    let mqtt = read_bytes(&row[1]);
    let invid = read_string(&row[2]);
    let unit_guid: UnitId = row[3].parse()?;
    let msg_id = read_string(&row[4]);
    let text = read_string(&row[5]);
    let context = read_bytes(&row[6]);
    let class = read_string(&row[7]);
    let level = read_int("level", &row[8])?;
    let area = read_string(&row[9]);
    let addr = read_string(&row[10]);
    let block = read_string(&row[11]);
    let kind = read_string(&row[12]);
    let bit = read_int("bit", &row[13])?;
    let invert_bit = read_int("invert_bit", &row[14])?;

    Ok(Record {
        n,
        mqtt,
        invid,
        unit_guid,
        msg_id,
        text,
        context,
        class,
        level,
        area,
        addr,
        block,
        kind,
        bit,
        invert_bit,
    })
}

/// Empty (after trimming) decodes to zero.
fn read_int(field: &'static str, raw: &str) -> Result<i64> {
    let value = raw.trim();
    if value.is_empty() {
        return Ok(0);
    }
    value.parse::<i64>().map_err(|_| PipelineError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn read_string(raw: &str) -> String {
    raw.trim().to_string()
}

fn read_bytes(raw: &str) -> Vec<u8> {
    raw.trim().as_bytes().to_vec()
}
