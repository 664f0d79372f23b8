//! Streaming CSV → record decoding.
//!
//! The first row is the header. Every following row becomes one [`Record`]
//! keyed by header column. Parsing is strict: a row whose column count
//! differs from the header fails the whole decode and nothing partial is
//! returned. Rows past the configured cap are not collected.

use crate::models::{DecodedCsv, Record};
use serde_json::Value;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("decoder task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy)]
pub struct CsvDecoder {
    max_rows: usize,
}

impl CsvDecoder {
    pub fn new(max_rows: usize) -> Self {
        Self { max_rows }
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// Decodes rows incrementally from `reader`
    pub fn decode_reader<R: Read>(&self, reader: R) -> Result<DecodedCsv, DecodeError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let mut rows = rdr.records();
        let mut records = Vec::new();

        while records.len() < self.max_rows {
            match rows.next() {
                Some(row) => records.push(to_record(&headers, &row?)),
                None => {
                    return Ok(DecodedCsv {
                        records,
                        truncated: false,
                    });
                }
            }
        }

        // Only probe for one more row; the rest of the input is never read.
        let truncated = rows.next().is_some();
        if truncated {
            tracing::warn!(
                "CSV input exceeds {} data rows, remaining rows were dropped",
                self.max_rows
            );
        }

        Ok(DecodedCsv { records, truncated })
    }

    pub fn decode_path(&self, path: &Path) -> Result<DecodedCsv, DecodeError> {
        let file = File::open(path).map_err(|source| DecodeError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.decode_reader(file)
    }

    /// Runs [`decode_path`](Self::decode_path) on the blocking pool
    pub async fn decode_file(&self, path: PathBuf) -> Result<DecodedCsv, DecodeError> {
        let decoder = *self;
        tokio::task::spawn_blocking(move || decoder.decode_path(&path))
            .await
            .map_err(|e| DecodeError::Task(e.to_string()))?
    }
}

fn to_record(headers: &csv::StringRecord, row: &csv::StringRecord) -> Record {
    let mut record = Record::new();
    for (name, value) in headers.iter().zip(row.iter()) {
        record.insert(name.to_string(), Value::String(value.to_string()));
    }
    record
}
