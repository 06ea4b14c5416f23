//! Route modules for Fatbox

pub mod proxy;
pub mod upload;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{Method, StatusCode, Uri},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check(State(_state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn index() -> &'static str {
    "fatbox is working.\n"
}

async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NotFoundResponse {
    message: String,
    error: &'static str,
    status_code: u16,
}

async fn not_found(method: Method, uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(NotFoundResponse {
            message: format!("Route {}:{} not found", method, uri.path()),
            error: "Not Found",
            status_code: 404,
        }),
    )
}

/// Build the full application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.config().storage.max_body_bytes;

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/favicon.ico", get(favicon))
        .merge(upload::router().layer(DefaultBodyLimit::max(body_limit)))
        .merge(proxy::router())
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
