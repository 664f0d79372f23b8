use crate::api::error::{AppError, TOO_LARGE_MESSAGE};
use crate::models::UploadedFile;
use crate::services::temp_store::{TempFileGuard, TempStore};
use crate::utils::validation::{validate_csv_upload, validate_file_size};
use axum::extract::Multipart;
use axum::extract::multipart::{Field, MultipartError};
use futures::TryStreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

/// Multipart field that carries the CSV file
pub const FILE_FIELD: &str = "csvFile";

/// An upload on disk together with the guard that deletes it
#[derive(Debug)]
pub struct ReceivedUpload {
    pub file: UploadedFile,
    pub guard: TempFileGuard,
}

/// Accepts exactly one CSV file from a multipart body and writes it to the store
#[derive(Debug, Clone)]
pub struct UploadReceiver {
    store: TempStore,
    max_file_size: usize,
}

impl UploadReceiver {
    pub fn new(store: TempStore, max_file_size: usize) -> Self {
        Self {
            store,
            max_file_size,
        }
    }

    pub async fn receive(&self, multipart: &mut Multipart) -> Result<ReceivedUpload, AppError> {
        let mut received: Option<ReceivedUpload> = None;

        match self.read_parts(multipart, &mut received).await {
            Ok(()) => received.ok_or(AppError::NoFile),
            Err(e) => match received {
                Some(upload) => Err(discard(upload.guard, e).await),
                None => Err(e),
            },
        }
    }

    async fn read_parts(
        &self,
        multipart: &mut Multipart,
        received: &mut Option<ReceivedUpload>,
    ) -> Result<(), AppError> {
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();

            // Plain text parts are ignored
            let Some(original_name) = field.file_name().map(str::to_string) else {
                continue;
            };

            if name != FILE_FIELD || received.is_some() {
                return Err(AppError::UnexpectedField(name));
            }

            let content_type = field.content_type().map(str::to_string);
            validate_csv_upload(&original_name, content_type.as_deref())
                .map_err(|e| AppError::InvalidFileType(e.to_string()))?;

            *received = Some(self.persist(field, original_name, content_type).await?);
        }

        Ok(())
    }

    async fn persist(
        &self,
        field: Field<'_>,
        original_name: String,
        content_type: Option<String>,
    ) -> Result<ReceivedUpload, AppError> {
        let (guard, mut file) = self.store.create(&original_name).await?;

        // One byte over the limit is enough to know the upload is too large
        let limit = self.max_file_size as u64;
        let body_with_io_error = field.map_err(std::io::Error::other);
        let mut reader = StreamReader::new(body_with_io_error).take(limit + 1);

        let written = match tokio::io::copy(&mut reader, &mut file).await {
            Ok(n) => n,
            Err(e) => {
                drop(file);
                return Err(discard(guard, copy_error(e)).await);
            }
        };

        if let Err(e) = file.flush().await {
            drop(file);
            let err = AppError::Internal(format!(
                "Failed to write {}: {}",
                guard.path().display(),
                e
            ));
            return Err(discard(guard, err).await);
        }
        drop(file);

        if validate_file_size(written as usize, self.max_file_size).is_err() {
            tracing::warn!(
                "Upload '{}' exceeds {} bytes, aborting",
                original_name,
                self.max_file_size
            );
            let err = AppError::PayloadTooLarge(TOO_LARGE_MESSAGE.to_string());
            return Err(discard(guard, err).await);
        }

        tracing::info!(
            "📦 Stored upload '{}' ({} bytes) at {}",
            original_name,
            written,
            guard.path().display()
        );

        Ok(ReceivedUpload {
            file: UploadedFile {
                original_name,
                path: guard.path().to_path_buf(),
                content_type,
                size: written,
            },
            guard,
        })
    }
}

/// Deletes a rejected upload before its error goes back to the handler.
/// The guard's `Drop` stays reserved for requests that are cancelled mid-flight.
async fn discard(guard: TempFileGuard, err: AppError) -> AppError {
    // Failures are logged by `remove`; the original error wins
    let _ = guard.remove().await;
    err
}

fn multipart_error(e: MultipartError) -> AppError {
    let err_msg = e.to_string();
    if err_msg.contains("length limit exceeded") {
        AppError::PayloadTooLarge(TOO_LARGE_MESSAGE.to_string())
    } else {
        AppError::BadRequest(err_msg)
    }
}

/// Splits copy failures into client-side stream errors and local write errors
fn copy_error(e: std::io::Error) -> AppError {
    let err_msg = e.to_string();
    let from_client = e
        .get_ref()
        .is_some_and(|inner| inner.is::<MultipartError>());

    if err_msg.contains("length limit exceeded") {
        AppError::PayloadTooLarge(TOO_LARGE_MESSAGE.to_string())
    } else if from_client {
        AppError::BadRequest(err_msg)
    } else {
        AppError::Internal(format!("Failed to store upload: {}", err_msg))
    }
}
