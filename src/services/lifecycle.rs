//! Process lifecycle around the HTTP server.
//!
//! The temp store is purged before the first request is accepted and again
//! once the server has stopped, whether it stopped because of a signal, an
//! expired grace period or a server error.

use crate::config::AppConfig;
use crate::services::temp_store::{PurgeReport, TempStore};
use anyhow::Result;
use axum::Router;
use std::future::{Future, IntoFuture};
use std::io;
use std::process::ExitCode;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{error, info, warn};

/// Why the server stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// All in-flight requests finished inside the grace period
    Graceful,
    /// Requests were still running when the grace period ran out
    GraceExpired,
    /// The server loop failed on its own
    ServerError(String),
}

impl ShutdownOutcome {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            ShutdownOutcome::Graceful => ExitCode::SUCCESS,
            ShutdownOutcome::GraceExpired | ShutdownOutcome::ServerError(_) => ExitCode::FAILURE,
        }
    }
}

/// Creates the store directory and removes anything a previous run left behind
pub async fn startup_purge(store: &TempStore) -> Result<PurgeReport> {
    store.prepare().await?;
    let report = store.purge().await;
    info!(
        "🧹 Startup purge of {}: {} removed, {} failed",
        store.dir().display(),
        report.removed,
        report.failed
    );
    Ok(report)
}

/// Serves `app` until `shutdown` resolves or the server fails.
///
/// After `shutdown`, new connections are refused and in-flight requests get
/// `config.shutdown_grace` to finish.
pub async fn serve_with_lifecycle<F>(
    listener: TcpListener,
    app: Router,
    store: TempStore,
    config: &AppConfig,
    shutdown: F,
) -> ShutdownOutcome
where
    F: Future<Output = ()> + Send,
{
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = stop_rx.changed().await;
        })
        .into_future();

    run_lifecycle(server, stop_tx, store, config, shutdown).await
}

/// Drives `server` on its own task and applies the exit policy around it.
///
/// `server` must stop once `stop` is set to true. If it returns or panics
/// before `shutdown` resolves, the store is purged and the call waits
/// `config.crash_exit_delay` before returning [`ShutdownOutcome::ServerError`].
pub async fn run_lifecycle<S, F>(
    server: S,
    stop: watch::Sender<bool>,
    store: TempStore,
    config: &AppConfig,
    shutdown: F,
) -> ShutdownOutcome
where
    S: Future<Output = io::Result<()>> + Send + 'static,
    F: Future<Output = ()> + Send,
{
    let mut server = tokio::spawn(server);

    let stopped_early = tokio::select! {
        joined = &mut server => Some(failure_reason(joined)),
        _ = shutdown => None,
    };

    if let Some(reason) = stopped_early {
        error!("❌ Server runtime error: {}", reason);
        purge_on_exit(&store).await;
        tokio::time::sleep(config.crash_exit_delay).await;
        return ShutdownOutcome::ServerError(reason);
    }

    info!(
        "🛑 Shutdown requested, waiting up to {:?} for in-flight requests...",
        config.shutdown_grace
    );
    let _ = stop.send(true);

    let outcome = match tokio::time::timeout(config.shutdown_grace, &mut server).await {
        Ok(Ok(Ok(()))) => ShutdownOutcome::Graceful,
        Ok(joined) => ShutdownOutcome::ServerError(failure_reason(joined)),
        Err(_) => {
            warn!("⏱️  Grace period elapsed with requests still running, forcing shutdown");
            server.abort();
            ShutdownOutcome::GraceExpired
        }
    };

    purge_on_exit(&store).await;
    outcome
}

fn failure_reason(joined: Result<io::Result<()>, JoinError>) -> String {
    match joined {
        Ok(Ok(())) => "server exited without a shutdown request".to_string(),
        Ok(Err(e)) => e.to_string(),
        Err(e) if e.is_panic() => {
            let payload = e.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            format!("server task panicked: {}", message)
        }
        Err(e) => e.to_string(),
    }
}

async fn purge_on_exit(store: &TempStore) {
    let report = store.purge().await;
    info!(
        "🧹 Shutdown purge of {}: {} removed, {} failed",
        store.dir().display(),
        report.removed,
        report.failed
    );
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}

/// Logs panics that escape a task instead of leaving them on stderr only.
///
/// Request handler panics are also answered by the catch-panic layer; this
/// hook only records them and never terminates the process.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        error!("💥 Unhandled {}", info);
    }));
}
