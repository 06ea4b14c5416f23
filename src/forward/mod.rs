//! Backend Forwarder
//!
//! Streams an artifact to one of the public file hosts as a
//! multipart/form-data POST and turns the host's answer into a URL.
//!
//! - `destination`: the supported hosts and their form/response contract
//! - `multipart`: producer task feeding the file part of the form through
//!   a bounded channel

pub mod destination;
pub mod multipart;

pub use destination::{Destination, ForwardOptions, UnsupportedDestination};
pub use multipart::{build_form, spawn_file_stream};

use std::path::Path;
use std::time::Duration;

use axum::http::StatusCode;

use crate::config::BackendsConfig;

// ============================================================================
// Errors
// ============================================================================

/// Failure to get a URL out of a backend
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("upload failed with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("{destination} upload failed: {message}")]
    BackendFailure {
        destination: Destination,
        message: String,
    },

    #[error("invalid {destination} response: {message}")]
    InvalidResponse {
        destination: Destination,
        message: String,
    },

    #[error("upload timed out after {0:?}")]
    Timeout(Duration),

    #[error("http request failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("failed to stream upload body: {0}")]
    Source(#[source] std::io::Error),
}

impl ForwardError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Rejected { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidResponse { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Network(_) => StatusCode::BAD_GATEWAY,
            Self::Source(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ============================================================================
// Forwarder
// ============================================================================

/// Uploads artifacts to the configured backends
#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    backends: BackendsConfig,
    timeout: Duration,
}

impl Forwarder {
    /// `client` must already carry `timeout` as its request timeout
    pub fn new(client: reqwest::Client, backends: BackendsConfig, timeout: Duration) -> Self {
        Self {
            client,
            backends,
            timeout,
        }
    }

    /// Upload `path` to `destination` under `filename` and return its public URL
    pub async fn forward(
        &self,
        destination: Destination,
        path: &Path,
        filename: &str,
        options: &ForwardOptions,
    ) -> Result<String, ForwardError> {
        let (body, producer) = spawn_file_stream(path.to_path_buf());
        let form = match build_form(destination, filename, options, body) {
            Ok(form) => form,
            Err(e) => {
                producer.abort();
                return Err(ForwardError::Network(e));
            }
        };

        let endpoint = &self.backends.endpoint(destination).upload_url;
        tracing::debug!(
            destination = %destination,
            endpoint = %endpoint,
            filename = %filename,
            "Forwarding upload"
        );

        let sent = self
            .client
            .post(endpoint)
            .multipart(form)
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                // Prefer the producer's own error when it broke the body
                producer.abort();
                return Err(match producer.await {
                    Ok(Err(source)) if source.kind() != std::io::ErrorKind::BrokenPipe => {
                        ForwardError::Source(source)
                    }
                    _ => self.classify(e),
                });
            }
        };

        let status = response.status();
        let text = response.text().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            return Err(ForwardError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        destination.parse_response(&text)
    }

    fn classify(&self, e: reqwest::Error) -> ForwardError {
        if e.is_timeout() {
            ForwardError::Timeout(self.timeout)
        } else {
            ForwardError::Network(e)
        }
    }
}
