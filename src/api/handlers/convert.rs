use crate::AppState;
use crate::api::error::AppError;
use crate::models::{ConversionResult, Record};
use crate::services::upload::ReceivedUpload;
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::time::Instant;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    #[schema(value_type = Vec<Object>)]
    pub data: Vec<Record>,
    pub row_count: usize,
    /// Elapsed decode time, e.g. `"15ms"`
    pub processing_time: String,
}

impl From<ConversionResult> for ConvertResponse {
    fn from(result: ConversionResult) -> Self {
        Self {
            row_count: result.row_count(),
            processing_time: result.processing_time(),
            data: result.records,
        }
    }
}

/// Body shape of every error response
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Multipart form accepted by `/convert`
#[derive(ToSchema)]
#[allow(dead_code, non_snake_case)]
pub struct ConvertUpload {
    #[schema(value_type = String, format = Binary)]
    csvFile: Vec<u8>,
}

#[utoipa::path(
    post,
    path = "/convert",
    request_body(content = ConvertUpload, content_type = "multipart/form-data", description = "CSV file in the `csvFile` field"),
    responses(
        (status = 200, description = "CSV converted", body = ConvertResponse),
        (status = 400, description = "No file, unexpected field or not a CSV file", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse),
        (status = 500, description = "Conversion failed or unexpected error", body = ErrorResponse)
    ),
    tag = "convert"
)]
pub async fn convert_csv(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            return AppError::BadRequest(rejection.body_text())
                .into_response_with(state.config.environment);
        }
    };

    match convert(&state, &mut multipart).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            // Consume the rest of the body so the client sees the JSON error, not a reset
            tracing::warn!("Conversion request failed: {}. Consuming remaining stream...", e);
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            e.into_response_with(state.config.environment)
        }
    }
}

async fn convert(state: &AppState, multipart: &mut Multipart) -> Result<ConvertResponse, AppError> {
    let ReceivedUpload { file, guard } = state.receiver.receive(multipart).await?;

    let started = Instant::now();
    let decoded = state.decoder.decode_file(file.path.clone()).await;

    // Removed before the response is built, on success and failure alike
    if let Err(e) = guard.remove().await {
        tracing::error!("Upload file {} was not deleted: {}", file.path.display(), e);
    }

    let decoded = decoded.map_err(|e| {
        tracing::error!("Failed to convert '{}': {}", file.original_name, e);
        AppError::Conversion(e)
    })?;

    let result = ConversionResult {
        records: decoded.records,
        elapsed: started.elapsed(),
    };

    tracing::info!(
        file = %file.original_name,
        bytes = file.size,
        rows = result.row_count(),
        truncated = decoded.truncated,
        "✅ Converted CSV in {}",
        result.processing_time()
    );

    Ok(result.into())
}
