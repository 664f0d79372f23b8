pub mod api;
pub mod config;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::csv_decoder::CsvDecoder;
use crate::services::temp_store::TempStore;
use crate::services::upload::UploadReceiver;
use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Room for multipart boundaries and headers on top of the file size limit
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::convert::convert_csv,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::convert::ConvertResponse,
            api::handlers::convert::ConvertUpload,
            api::handlers::convert::ErrorResponse,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "convert", description = "CSV conversion endpoints"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: TempStore,
    pub receiver: UploadReceiver,
    pub decoder: CsvDecoder,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let store = TempStore::new(config.upload_dir.clone());
        Self {
            receiver: UploadReceiver::new(store.clone(), config.max_file_size),
            decoder: CsvDecoder::new(config.max_rows),
            store,
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let routes = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/convert", post(api::handlers::convert::convert_csv));

    with_service_layers(routes, state)
}

/// Wraps `routes` in the panic, logging, request-id, CORS and body-limit layers
pub fn with_service_layers(routes: Router<AppState>, state: AppState) -> Router {
    let environment = state.config.environment;
    let body_limit = state.config.max_file_size + MULTIPART_OVERHEAD;

    routes
        .layer(CatchPanicLayer::custom(api::error::panic_response(
            environment,
        )))
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
