use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;

/// One CSV data row keyed by header column, in header order.
///
/// Backed by `serde_json::Map` with `preserve_order`, so a repeated header
/// name keeps its first position and takes the last value.
pub type Record = Map<String, Value>;

/// An upload persisted in the temp store for the lifetime of one request
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub path: PathBuf,
    pub content_type: Option<String>,
    pub size: u64,
}

/// Output of a successful decode
#[derive(Debug, Default)]
pub struct DecodedCsv {
    pub records: Vec<Record>,
    /// Set when data rows past the row cap were dropped
    pub truncated: bool,
}

/// Records plus timing, shaped into the response body by the handler
#[derive(Debug)]
pub struct ConversionResult {
    pub records: Vec<Record>,
    pub elapsed: Duration,
}

impl ConversionResult {
    pub fn row_count(&self) -> usize {
        self.records.len()
    }

    /// Human-readable elapsed time, e.g. `"12ms"`
    pub fn processing_time(&self) -> String {
        format!("{}ms", self.elapsed.as_millis())
    }
}
