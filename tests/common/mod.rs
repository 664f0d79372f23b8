#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    response::Response,
};
use csv_convert_server::config::AppConfig;
use csv_convert_server::{AppState, create_app};
use http_body_util::BodyExt;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "---------------------------123456789012345678901234567";

pub struct TestApp {
    pub app: Router,
    pub dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::with_upload_dir(dir.path());
        adjust(&mut config);
        let app = create_app(AppState::new(config));
        Self { app, dir }
    }

    pub fn store_entries(&self) -> Vec<String> {
        store_entries(self.dir.path())
    }

    pub async fn post_multipart(&self, body: impl Into<Body>) -> Response {
        self.app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/convert")
                    .header(
                        "Content-Type",
                        format!("multipart/form-data; boundary={}", BOUNDARY),
                    )
                    .body(body.into())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    pub async fn upload(&self, filename: &str, content_type: &str, content: &str) -> Response {
        self.post_multipart(file_part("csvFile", filename, content_type, content) + &closing())
            .await
    }
}

pub fn store_entries(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

pub fn file_part(field: &str, filename: &str, content_type: &str, content: &str) -> String {
    format!(
        "--{boundary}\r\n\
        Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
        Content-Type: {content_type}\r\n\r\n\
        {content}\r\n",
        boundary = BOUNDARY,
    )
}

pub fn text_part(field: &str, value: &str) -> String {
    format!(
        "--{boundary}\r\n\
        Content-Disposition: form-data; name=\"{field}\"\r\n\r\n\
        {value}\r\n",
        boundary = BOUNDARY,
    )
}

pub fn closing() -> String {
    format!("--{}--\r\n", BOUNDARY)
}

pub async fn read_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or_else(|_| {
        panic!(
            "Response with status {} is not JSON: {:?}",
            status,
            String::from_utf8_lossy(&body)
        )
    });
    (status, json)
}
