use clap::Parser;
use csv_convert_server::api::middleware::request_id::REQUEST_ID_HEADER;
use csv_convert_server::config::AppConfig;
use csv_convert_server::services::lifecycle::{
    self, ShutdownOutcome, install_panic_hook, serve_with_lifecycle, shutdown_signal,
};
use csv_convert_server::{AppState, create_app};
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::process::ExitCode;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port for the API server (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // 1. Environment & Logging
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "csv_convert_server=info,tower_http=info,metrics=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
    install_panic_hook();

    let mut config = AppConfig::from_env();
    if let Some(port) = args.port {
        config.port = port;
    }

    info!("🚀 Starting CSV conversion service...");
    info!(
        "⚙️  Config: Upload Dir={}, Max Size={}MB, Max Rows={}, Env={:?}",
        config.upload_dir.display(),
        config.max_file_size / 1024 / 1024,
        config.max_rows,
        config.environment
    );

    // 2. Clear leftovers before accepting requests
    let state = AppState::new(config.clone());
    let store = state.store.clone();
    lifecycle::startup_purge(&store).await?;

    // 3. HTTP server
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    let app = create_app(state).layer(trace_layer);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ Server listening on: http://0.0.0.0:{}", config.port);
    info!("📖 Swagger UI documentation: http://localhost:{}/swagger-ui", config.port);

    // 4. Run until signal or failure
    let outcome = serve_with_lifecycle(listener, app, store, &config, shutdown_signal()).await;

    match outcome {
        ShutdownOutcome::Graceful => info!("👋 Server exited cleanly."),
        ShutdownOutcome::GraceExpired => {
            tracing::error!(
                "🛑 Grace period of {:?} expired with requests still running, forcing exit",
                config.shutdown_grace
            );
            // Blocked decode tasks would otherwise hold the runtime open
            std::process::exit(1)
        }
        ShutdownOutcome::ServerError(ref reason) => {
            tracing::error!("🛑 Exiting after server failure: {}", reason)
        }
    }

    Ok(outcome.exit_code())
}
