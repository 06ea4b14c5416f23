//! Download passthrough
//!
//! `GET /<destination>/<file>` is fetched from the backend's public host and
//! streamed back as-is: status and headers are mirrored, `Range` is
//! forwarded.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName},
    response::Response,
    routing::get,
    Router,
};

use crate::error::{AppError, Result};
use crate::forward::Destination;
use crate::state::AppState;

/// Create the download router, one prefix per destination
pub fn router() -> Router<AppState> {
    let mut router = Router::new();
    for destination in Destination::ALL {
        let prefix = destination.as_str();
        router = router
            .route(&format!("/{}/", prefix), get(missing_path))
            .route(
                &format!("/{}/*path", prefix),
                get(
                    move |State(state): State<AppState>,
                          Path(path): Path<String>,
                          headers: HeaderMap| async move {
                        proxy_download(state, destination, path, headers).await
                    },
                ),
            );
    }
    router
}

async fn missing_path() -> AppError {
    AppError::BadRequest("File path is missing.".to_string())
}

async fn proxy_download(
    state: AppState,
    destination: Destination,
    path: String,
    headers: HeaderMap,
) -> Result<Response> {
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return Err(AppError::BadRequest("File path is missing.".to_string()));
    }

    let target = format!(
        "{}{}",
        state.config().backends.endpoint(destination).download_url,
        path
    );
    tracing::info!(destination = %destination, target = %target, "Proxying download");

    let mut request = state.http().get(&target);
    if let Some(range) = headers.get(header::RANGE) {
        request = request.header(header::RANGE, range.clone());
    }

    let upstream = request
        .send()
        .await
        .map_err(|e| AppError::BadGateway(format!("proxy error for {}: {}", target, e)))?;

    let mut response = Response::builder().status(upstream.status());
    if let Some(out) = response.headers_mut() {
        for (name, value) in upstream.headers() {
            if !is_hop_by_hop(name) {
                out.append(name.clone(), value.clone());
            }
        }
    }

    response
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// Connection-level headers that belong to one hop only
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}
