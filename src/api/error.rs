use crate::config::Environment;
use crate::services::csv_decoder::DecodeError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::any::Any;
use thiserror::Error;

pub const NO_FILE_MESSAGE: &str = "No file uploaded";
pub const INVALID_TYPE_MESSAGE: &str = "Only CSV files are allowed";
pub const UNEXPECTED_FIELD_MESSAGE: &str = "Unexpected field";
pub const TOO_LARGE_MESSAGE: &str = "File too large";
pub const CONVERSION_FAILED_MESSAGE: &str = "Failed to convert file";
pub const UNEXPECTED_ERROR_MESSAGE: &str = "Server encountered an unexpected error";
const HIDDEN_DETAIL_MESSAGE: &str = "An unexpected error occurred";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("No file uploaded")]
    NoFile,

    #[error("Invalid file type: {0}")]
    InvalidFileType(String),

    #[error("Unexpected field: {0}")]
    UnexpectedField(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Conversion failed: {0}")]
    Conversion(#[from] DecodeError),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NoFile
            | AppError::InvalidFileType(_)
            | AppError::UnexpectedField(_)
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Conversion(_) | AppError::Internal(_) | AppError::Anyhow(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Renders the error, showing unexpected-error detail only outside production
    pub fn into_response_with(self, environment: Environment) -> Response {
        let status = self.status();
        let message = match self {
            AppError::NoFile => NO_FILE_MESSAGE.to_string(),
            AppError::InvalidFileType(detail) => {
                tracing::debug!("Rejected upload type: {}", detail);
                INVALID_TYPE_MESSAGE.to_string()
            }
            AppError::UnexpectedField(field) => {
                tracing::debug!("Rejected unexpected file field '{}'", field);
                UNEXPECTED_FIELD_MESSAGE.to_string()
            }
            AppError::BadRequest(msg) => msg,
            AppError::PayloadTooLarge(msg) => msg,
            AppError::Conversion(e) => {
                tracing::error!("Conversion error: {:?}", e);
                CONVERSION_FAILED_MESSAGE.to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                return unexpected_error_response(msg, environment);
            }
            AppError::Anyhow(e) => {
                tracing::error!("Anyhow error: {:?}", e);
                return unexpected_error_response(format!("{:#}", e), environment);
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.into_response_with(Environment::Production)
    }
}

/// The catch-all 500 body: `{ error, message }`
pub fn unexpected_error_response(detail: String, environment: Environment) -> Response {
    let message = if environment.is_production() {
        HIDDEN_DETAIL_MESSAGE.to_string()
    } else {
        detail
    };

    let body = Json(json!({
        "error": UNEXPECTED_ERROR_MESSAGE,
        "message": message,
    }));

    (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
}

/// Turns a caught handler panic into the catch-all 500 body
pub fn panic_response(
    environment: Environment,
) -> impl Fn(Box<dyn Any + Send + 'static>) -> Response + Clone {
    move |panic| {
        let detail = if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else if let Some(s) = panic.downcast_ref::<&str>() {
            s.to_string()
        } else {
            "handler panicked".to_string()
        };

        tracing::error!("💥 Request handler panicked: {}", detail);
        unexpected_error_response(detail, environment)
    }
}
