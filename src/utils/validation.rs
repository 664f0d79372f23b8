use anyhow::{Result, anyhow};

/// Extension accepted in place of a `text/csv` media type
pub const CSV_EXTENSION: &str = ".csv";

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Returns true when the declared media type is `text/csv` (parameters ignored)
pub fn is_csv_mime(content_type: &str) -> bool {
    content_type
        .parse::<mime::Mime>()
        .map(|m| m.essence_str() == mime::TEXT_CSV.essence_str())
        .unwrap_or(false)
}

/// Returns true when the client filename ends in `.csv` (any case)
pub fn has_csv_extension(filename: &str) -> bool {
    filename.to_lowercase().ends_with(CSV_EXTENSION)
}

/// Accepts an upload when either the media type or the filename says CSV.
///
/// Both checks ignore case on purpose: `data.CSV` and `Text/CSV; charset=utf-8`
/// are accepted, so clients that upper-case extensions or add a charset are not
/// turned away. Any other type is rejected unless the name ends in `.csv`,
/// which means `application/octet-stream` passes only with a CSV filename.
pub fn validate_csv_upload(filename: &str, content_type: Option<&str>) -> Result<()> {
    if content_type.is_some_and(is_csv_mime) || has_csv_extension(filename) {
        return Ok(());
    }

    Err(anyhow!(ValidationError {
        code: "INVALID_FILE_TYPE",
        message: format!(
            "File '{}' with media type '{}' is not a CSV file",
            filename,
            content_type.unwrap_or("none")
        ),
    }))
}

/// Validates file size against maximum limit
pub fn validate_file_size(size: usize, max_size: usize) -> Result<()> {
    if size > max_size {
        return Err(anyhow!(ValidationError {
            code: "FILE_TOO_LARGE",
            message: format!(
                "File size {} bytes exceeds maximum allowed {} bytes",
                size, max_size
            ),
        }));
    }
    Ok(())
}

/// Builds the on-disk name `<millis>-<original>`.
///
/// Only path separators and control characters are replaced, so the result
/// always stays a direct child of the store directory.
pub fn stored_file_name(timestamp_millis: i64, original: &str) -> String {
    let contained: String = original
        .chars()
        .map(|c| {
            if c.is_control() || c == '/' || c == '\\' {
                '_'
            } else {
                c
            }
        })
        .collect();

    let contained = match contained.as_str() {
        "" | "." | ".." => "upload.csv".to_string(),
        _ => contained,
    };

    format!("{}-{}", timestamp_millis, contained)
}
