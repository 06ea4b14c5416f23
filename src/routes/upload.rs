//! Upload Routes
//!
//! Endpoints:
//! - POST /chunk - Store one chunk of a chunked upload
//! - POST /finish - Assemble a chunked upload and forward it
//! - POST /direct - Forward a single-request upload

use std::collections::HashMap;

use axum::{
    async_trait,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        FromRequest, Multipart, Request, State,
    },
    http::header,
    response::IntoResponse,
    routing::post,
    Form, Json, Router,
};
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::forward::{Destination, ForwardOptions};
use crate::state::AppState;
use crate::upload::{validate_token, Artifact, ChunkAck, UploadError, UploadRequest, UrlResponse};

// ============================================================================
// Error Response
// ============================================================================

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

impl IntoResponse for UploadError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Upload request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "Upload request rejected");
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        });

        (status, body).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Create the upload router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chunk", post(upload_chunk))
        .route("/finish", post(finish))
        .route("/direct", post(direct))
}

// ============================================================================
// Form Fields
// ============================================================================

/// Text fields of a multipart or urlencoded form. Empty values count as absent.
#[derive(Debug, Default)]
pub struct FormFields(HashMap<String, String>);

impl FormFields {
    fn insert(&mut self, name: String, value: String) {
        self.0.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn take(&mut self, name: &str) -> Option<String> {
        self.0.remove(name).filter(|v| !v.is_empty())
    }

    /// Build the pipeline request from `destination`, `userhash` and `time`
    fn upload_request(
        &mut self,
        filename: String,
        default_ttl: &str,
    ) -> Result<UploadRequest, UploadError> {
        let destination: Destination = self
            .take("destination")
            .ok_or(UploadError::MissingField("destination"))?
            .parse()?;

        Ok(UploadRequest {
            destination,
            filename,
            options: ForwardOptions {
                auth_token: self.take("userhash"),
                ttl: self.take("time").unwrap_or_else(|| default_ttl.to_string()),
            },
        })
    }
}

#[async_trait]
impl<S> FromRequest<S> for FormFields
where
    S: Send + Sync,
{
    type Rejection = UploadError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("multipart/form-data"));

        if !is_multipart {
            let Form(fields) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| UploadError::InvalidInput(e.body_text()))?;
            return Ok(Self(fields));
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(invalid_multipart)?;
        let mut fields = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(invalid_form)? {
            let name = field.name().unwrap_or_default().to_string();
            let value = field.text().await.map_err(invalid_form)?;
            fields.insert(name, value);
        }
        Ok(fields)
    }
}

fn invalid_form(e: MultipartError) -> UploadError {
    UploadError::InvalidInput(format!("Invalid form: {}", e.body_text()))
}

fn invalid_multipart(e: MultipartRejection) -> UploadError {
    UploadError::InvalidInput(format!("Invalid form: {}", e.body_text()))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /chunk
///
/// Fields: `uploadId`, `index`, `chunk` (file), in any order. The chunk is
/// streamed to disk as it arrives and moved into its session once the form
/// is complete. Re-sending an index replaces it.
async fn upload_chunk(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ChunkAck>, UploadError> {
    let mut multipart = multipart.map_err(invalid_multipart)?;
    let store = state.pipeline().chunk_store();
    let mut fields = FormFields::default();
    let mut staged = None;

    while let Some(field) = multipart.next_field().await.map_err(invalid_form)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "chunk" {
            staged = Some(store.stage_chunk(field).await?);
        } else {
            let value = field.text().await.map_err(invalid_form)?;
            fields.insert(name, value);
        }
    }

    let upload_id = fields.take("uploadId").ok_or(UploadError::MissingField("uploadId"))?;
    let index = fields.take("index").ok_or(UploadError::MissingField("index"))?;
    let staged = staged.ok_or(UploadError::MissingField("chunk"))?;
    let size = staged.size();

    store.commit_chunk(staged, &upload_id, &index).await?;

    tracing::info!(upload_id = %upload_id, index = %index, size = %format_bytes(size), "Received chunk");

    Ok(Json(ChunkAck {
        message: format!("Chunk {} for {} received.", index, upload_id),
        upload_id,
        index,
    }))
}

/// POST /finish
///
/// Fields: `uploadId`, `filename`, `destination`, optional `userhash` and
/// `time`. The session's chunks are gone after this returns, whatever the
/// outcome.
async fn finish(
    State(state): State<AppState>,
    mut fields: FormFields,
) -> Result<Json<UrlResponse>, UploadError> {
    let upload_id = fields.take("uploadId").ok_or(UploadError::MissingField("uploadId"))?;
    validate_token("uploadId", &upload_id)?;

    let pipeline = state.pipeline();
    let request = fields
        .take("filename")
        .ok_or(UploadError::MissingField("filename"))
        .and_then(|filename| fields.upload_request(filename, &state.config().forward.default_ttl));

    let request = match request {
        Ok(request) => request,
        Err(e) => {
            pipeline.discard_session(&upload_id).await;
            return Err(e);
        }
    };

    let outcome = pipeline.finish_chunked(&upload_id, request).await?;
    Ok(Json(UrlResponse { url: outcome.url }))
}

/// POST /direct
///
/// Fields: `file`, `destination`, optional `userhash` and `time`. The file
/// is streamed to a temporary artifact. A `destination` sent ahead of the
/// file is checked first, so an unknown one is refused before any disk
/// write.
async fn direct(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UrlResponse>, UploadError> {
    let mut multipart = multipart.map_err(invalid_multipart)?;
    let mut fields = FormFields::default();
    let mut received = None;

    while let Some(mut field) = multipart.next_field().await.map_err(invalid_form)? {
        let name = field.name().unwrap_or_default().to_string();
        if name != "file" {
            let value = field.text().await.map_err(invalid_form)?;
            fields.insert(name, value);
            continue;
        }

        if let Some(destination) = fields.get("destination") {
            destination.parse::<Destination>()?;
        }

        let filename = field.file_name().unwrap_or("upload").to_string();
        let (artifact, mut out) = Artifact::create(&state.config().storage.temp_dir, &filename)
            .await
            .map_err(|e| UploadError::StorageError(format!("Failed to save temporary file: {}", e)))?;

        let mut size = 0u64;
        while let Some(bytes) = field.chunk().await.map_err(invalid_form)? {
            out.write_all(&bytes)
                .await
                .map_err(|e| UploadError::StorageError(format!("Failed to write file to disk: {}", e)))?;
            size += bytes.len() as u64;
        }
        out.flush()
            .await
            .map_err(|e| UploadError::StorageError(format!("Failed to finalize temporary file: {}", e)))?;

        received = Some((artifact, filename, size));
    }

    let (artifact, filename, size) = received.ok_or(UploadError::MissingField("file"))?;
    let request = fields.upload_request(filename, &state.config().forward.default_ttl)?;

    tracing::info!(
        filename = %request.filename,
        destination = %request.destination,
        size = %format_bytes(size),
        "Direct upload received"
    );

    let outcome = state.pipeline().process(artifact, &request).await?;
    Ok(Json(UrlResponse { url: outcome.url }))
}

// ============================================================================
// Helpers
// ============================================================================

/// Human readable byte count for logs
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    match bytes {
        b if b >= GB => format!("{:.2} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.2} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.2} KB", b as f64 / KB as f64),
        b => format!("{} B", b),
    }
}
