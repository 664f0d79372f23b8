mod common;

use axum::{Router, routing::get};
use common::store_entries;
use csv_convert_server::config::AppConfig;
use csv_convert_server::services::lifecycle::{
    ShutdownOutcome, serve_with_lifecycle, startup_purge,
};
use csv_convert_server::services::temp_store::TempStore;
use csv_convert_server::{AppState, create_app};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

#[tokio::test]
async fn test_restart_after_crash_clears_store_before_serving() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("1700000000000-orphan.csv"), "a\n1\n").unwrap();
    std::fs::write(dir.path().join("1700000000001-orphan.csv"), "b\n2\n").unwrap();

    let config = AppConfig::with_upload_dir(dir.path());
    let store = TempStore::new(dir.path());
    let report = startup_purge(&store).await.unwrap();

    assert_eq!(report.removed, 2);
    assert!(store_entries(dir.path()).is_empty());

    let (listener, addr) = bind().await;
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let app = create_app(AppState::new(config.clone()));
    let server = tokio::spawn(async move {
        serve_with_lifecycle(listener, app, store, &config, async move {
            let _ = stop_rx.await;
        })
        .await
    });

    let health: serde_json::Value = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert!(store_entries(dir.path()).is_empty());

    stop_tx.send(()).unwrap();
    assert_eq!(server.await.unwrap(), ShutdownOutcome::Graceful);
}

#[tokio::test]
async fn test_graceful_shutdown_purges_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::with_upload_dir(dir.path());
    let store = TempStore::new(dir.path());
    startup_purge(&store).await.unwrap();

    let (listener, addr) = bind().await;
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let app = create_app(AppState::new(config.clone()));
    let server = tokio::spawn(async move {
        serve_with_lifecycle(listener, app, store, &config, async move {
            let _ = stop_rx.await;
        })
        .await
    });

    let status = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .status();
    assert!(status.is_success());

    // Something left behind while running is swept on the way out
    std::fs::write(dir.path().join("1700000000000-stray.csv"), "x\n").unwrap();

    stop_tx.send(()).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome, ShutdownOutcome::Graceful);
    assert_eq!(outcome.exit_code(), std::process::ExitCode::SUCCESS);
    assert!(store_entries(dir.path()).is_empty());
}

#[tokio::test]
async fn test_grace_period_expiry_forces_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::with_upload_dir(dir.path());
    config.shutdown_grace = Duration::from_millis(100);
    let store = TempStore::new(dir.path());
    startup_purge(&store).await.unwrap();

    let slow = Router::new().route(
        "/slow",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            "done"
        }),
    );

    let (listener, addr) = bind().await;
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        serve_with_lifecycle(listener, slow, store, &config, async move {
            let _ = stop_rx.await;
        })
        .await
    });

    let client = tokio::spawn(async move {
        let _ = reqwest::get(format!("http://{}/slow", addr)).await;
    });

    // Let the slow request reach its handler
    tokio::time::sleep(Duration::from_millis(300)).await;
    std::fs::write(dir.path().join("1700000000000-inflight.csv"), "x\n").unwrap();

    stop_tx.send(()).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome, ShutdownOutcome::GraceExpired);
    assert_eq!(outcome.exit_code(), std::process::ExitCode::FAILURE);
    assert!(store_entries(dir.path()).is_empty());

    client.abort();
}
