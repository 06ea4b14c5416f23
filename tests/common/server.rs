//! Server test utilities.

use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use fatbox::config::{Config, DatabaseConfig, StorageConfig};
use fatbox::db;
use fatbox::routes;
use fatbox::state::AppState;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use super::backend::FakeBackend;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub backend: FakeBackend,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a server whose backends all point at a fresh fake backend
    pub async fn new() -> Self {
        Self::with_config(|_, _| {}).await
    }

    /// Like `new`, with a hook to adjust the config before the state is built
    pub async fn with_config(adjust: impl FnOnce(&mut Config, &FakeBackend)) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let backend = FakeBackend::start().await;

        let uploads_dir = temp_dir.path().join("uploads");
        let artifacts_dir = temp_dir.path().join("temp");
        let db_dir = temp_dir.path().join("db");
        for dir in [&uploads_dir, &artifacts_dir, &db_dir] {
            std::fs::create_dir_all(dir).expect("Failed to create test directory");
        }

        let mut config = Config {
            database: DatabaseConfig {
                url: format!("sqlite://{}", db_dir.join("fatbox.db").display()),
                max_connections: 2,
            },
            storage: StorageConfig {
                uploads_dir,
                temp_dir: artifacts_dir,
                max_body_bytes: 16 * 1024 * 1024,
            },
            backends: backend.backends(),
            ..Config::default()
        };
        config.forward.timeout_secs = 10;
        adjust(&mut config, &backend);

        let pool = db::create_pool(&config.database.url, config.database.max_connections)
            .await
            .expect("Failed to create database");
        let state = AppState::new(config, pool).expect("Failed to build state");
        let router = routes::app(state.clone());

        Self {
            router,
            state,
            backend,
            _temp_dir: temp_dir,
        }
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.state.config().storage.uploads_dir
    }

    pub fn temp_dir(&self) -> &Path {
        &self.state.config().storage.temp_dir
    }

    /// Send a request and decode the JSON answer (`Null` when the body is not JSON)
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn post_form(&self, uri: &str, form: FormBuilder) -> (StatusCode, Value) {
        let (content_type, body) = form.finish();
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    pub async fn put_chunk(&self, upload_id: &str, index: &str, data: &[u8]) -> (StatusCode, Value) {
        let form = FormBuilder::new()
            .text("uploadId", upload_id)
            .text("index", index)
            .file("chunk", "blob", data);
        self.post_form("/chunk", form).await
    }

    pub async fn finish(
        &self,
        upload_id: &str,
        filename: &str,
        destination: &str,
    ) -> (StatusCode, Value) {
        let form = FormBuilder::new()
            .text("uploadId", upload_id)
            .text("filename", filename)
            .text("destination", destination);
        self.post_form("/finish", form).await
    }

    pub async fn direct(&self, destination: &str, filename: &str, data: &[u8]) -> (StatusCode, Value) {
        let form = FormBuilder::new()
            .text("destination", destination)
            .file("file", filename, data);
        self.post_form("/direct", form).await
    }
}

/// Hand-built multipart/form-data request body
pub struct FormBuilder {
    body: Vec<u8>,
}

const BOUNDARY: &str = "fatbox-test-boundary";

#[allow(dead_code)]
impl FormBuilder {
    pub fn new() -> Self {
        Self { body: Vec::new() }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn finish(mut self) -> (String, Vec<u8>) {
        self.body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        (format!("multipart/form-data; boundary={BOUNDARY}"), self.body)
    }
}

/// Entries left in a directory, recursively
#[allow(dead_code)]
pub fn leftover_files(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return found;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            found.extend(leftover_files(&path));
        }
        found.push(path);
    }
    found
}
