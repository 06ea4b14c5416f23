//! In-process stand-in for the public file hosts.
//!
//! Every upload route records what it received so tests can check the
//! forwarded bytes and count how often a backend was reached.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use fatbox::config::{BackendEndpoint, BackendsConfig};
use serde_json::json;

/// One multipart upload as seen by the fake backend
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct ReceivedUpload {
    pub backend: &'static str,
    pub filename: Option<String>,
    pub fields: Vec<(String, String)>,
    pub data: Vec<u8>,
}

#[derive(Default)]
struct BackendLog {
    hits: AtomicUsize,
    uploads: Mutex<Vec<ReceivedUpload>>,
}

#[allow(dead_code)]
pub struct FakeBackend {
    pub addr: SocketAddr,
    log: Arc<BackendLog>,
}

#[allow(dead_code)]
impl FakeBackend {
    /// Bind on an ephemeral port and serve until the test runtime ends
    pub async fn start() -> Self {
        let log = Arc::new(BackendLog::default());
        let router = Router::new()
            .route("/pomf/upload.php", post(pomf_upload))
            .route("/catbox/api.php", post(catbox_upload))
            .route("/litterbox/api.php", post(litterbox_upload))
            .route("/fail", post(failing_upload))
            .route("/slow", post(slow_upload))
            .route("/files/*path", get(download))
            .with_state(log.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake backend");
        let addr = listener.local_addr().expect("Fake backend has no address");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("Fake backend stopped");
        });

        Self { addr, log }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Endpoints pointing every destination at this server
    pub fn backends(&self) -> BackendsConfig {
        BackendsConfig {
            pomf: BackendEndpoint {
                upload_url: self.url("/pomf/upload.php"),
                download_url: self.url("/files/pomf/"),
            },
            catbox: BackendEndpoint {
                upload_url: self.url("/catbox/api.php"),
                download_url: self.url("/files/catbox/"),
            },
            litterbox: BackendEndpoint {
                upload_url: self.url("/litterbox/api.php"),
                download_url: self.url("/files/litterbox/"),
            },
        }
    }

    /// Number of upload requests received, failed ones included
    pub fn hits(&self) -> usize {
        self.log.hits.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> Vec<ReceivedUpload> {
        self.log.uploads.lock().unwrap().clone()
    }
}

async fn receive(
    log: &BackendLog,
    backend: &'static str,
    file_field: &str,
    mut multipart: Multipart,
) -> usize {
    let mut upload = ReceivedUpload {
        backend,
        filename: None,
        fields: Vec::new(),
        data: Vec::new(),
    };

    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        if name == file_field {
            upload.filename = field.file_name().map(str::to_string);
            upload.data = field.bytes().await.unwrap().to_vec();
        } else {
            upload.fields.push((name, field.text().await.unwrap()));
        }
    }

    let n = log.hits.fetch_add(1, Ordering::SeqCst) + 1;
    log.uploads.lock().unwrap().push(upload);
    n
}

async fn pomf_upload(State(log): State<Arc<BackendLog>>, multipart: Multipart) -> Json<serde_json::Value> {
    let n = receive(&log, "pomf", "files[]", multipart).await;
    Json(json!({
        "success": true,
        "files": [{ "url": format!("https://pomf.test/f{}.bin", n) }]
    }))
}

async fn catbox_upload(State(log): State<Arc<BackendLog>>, multipart: Multipart) -> String {
    let n = receive(&log, "catbox", "fileToUpload", multipart).await;
    format!("https://files.catbox.test/f{}.bin\n", n)
}

async fn litterbox_upload(State(log): State<Arc<BackendLog>>, multipart: Multipart) -> String {
    let n = receive(&log, "litterbox", "fileToUpload", multipart).await;
    format!("https://litter.catbox.test/f{}.bin", n)
}

async fn failing_upload(State(log): State<Arc<BackendLog>>, multipart: Multipart) -> impl IntoResponse {
    receive(&log, "fail", "fileToUpload", multipart).await;
    (StatusCode::INTERNAL_SERVER_ERROR, "backend exploded")
}

/// Answers long after any sane client timeout
async fn slow_upload() -> &'static str {
    tokio::time::sleep(std::time::Duration::from_secs(30)).await;
    "https://files.catbox.test/late.bin"
}

async fn download(Path(path): Path<String>, headers: HeaderMap) -> Response {
    match headers.get(header::RANGE).and_then(|v| v.to_str().ok()) {
        Some(range) => (
            StatusCode::PARTIAL_CONTENT,
            [(header::CONTENT_RANGE, "bytes 0-3/10".to_string())],
            format!("{} {}", path, range),
        )
            .into_response(),
        None => (StatusCode::OK, format!("{} full", path)).into_response(),
    }
}
