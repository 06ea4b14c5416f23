//! Upload types shared by the chunk store, assembler and pipeline

use serde::{Deserialize, Serialize};

use crate::dedup::DedupError;
use crate::forward::{Destination, ForwardError, ForwardOptions, UnsupportedDestination};

// ============================================================================
// Constants
// ============================================================================

/// Maximum length of an upload id or chunk index token
pub const MAX_TOKEN_LEN: usize = 128;

/// Prefix of chunk file names inside a session directory
pub const CHUNK_PREFIX: &str = "chunk_";

// ============================================================================
// Request / Response Types
// ============================================================================

/// Acknowledgement for a stored chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkAck {
    pub message: String,
    pub upload_id: String,
    pub index: String,
}

/// Final answer of `/finish` and `/direct`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlResponse {
    pub url: String,
}

/// What to do with a finished artifact
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub destination: Destination,
    /// Name the backend will see
    pub filename: String,
    pub options: ForwardOptions,
}

// ============================================================================
// Error Types
// ============================================================================

/// Upload error types
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No chunks found for {0}")]
    NoChunks(String),

    #[error(transparent)]
    UnsupportedDestination(#[from] UnsupportedDestination),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Assembly failed: {0}")]
    AssemblyError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Upload failed: {0}")]
    Forward(#[from] ForwardError),
}

impl UploadError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::MissingField(_) => StatusCode::BAD_REQUEST,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NoChunks(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedDestination(_) => StatusCode::BAD_REQUEST,
            Self::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::AssemblyError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Forward(e) => e.status_code(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingField(_) => "MISSING_FIELD",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::NoChunks(_) => "NO_CHUNKS",
            Self::UnsupportedDestination(_) => "UNSUPPORTED_DESTINATION",
            Self::StorageError(_) => "STORAGE_ERROR",
            Self::AssemblyError(_) => "ASSEMBLY_ERROR",
            Self::DatabaseError(_) => "DATABASE_ERROR",
            Self::Forward(ForwardError::Timeout(_)) => "FORWARD_TIMEOUT",
            Self::Forward(ForwardError::Network(_)) => "BACKEND_UNREACHABLE",
            Self::Forward(_) => "FORWARD_FAILED",
        }
    }
}

impl From<DedupError> for UploadError {
    fn from(e: DedupError) -> Self {
        UploadError::DatabaseError(e.to_string())
    }
}

/// Check that a client-supplied token is safe to use as a path segment
pub fn validate_token(field: &'static str, value: &str) -> Result<(), UploadError> {
    if value.is_empty() {
        return Err(UploadError::MissingField(field));
    }
    if value.len() > MAX_TOKEN_LEN {
        return Err(UploadError::InvalidInput(format!(
            "{} longer than {} characters",
            field, MAX_TOKEN_LEN
        )));
    }
    if !value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(UploadError::InvalidInput(format!(
            "{} may only contain letters, digits, '-' and '_'",
            field
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_validate_token() {
        assert!(validate_token("uploadId", "3f2a-9c_01").is_ok());
        assert!(matches!(
            validate_token("uploadId", ""),
            Err(UploadError::MissingField("uploadId"))
        ));
        assert!(validate_token("uploadId", "../etc").is_err());
        assert!(validate_token("uploadId", "a/b").is_err());
        assert!(validate_token("index", &"9".repeat(MAX_TOKEN_LEN + 1)).is_err());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(UploadError::MissingField("filename").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            UploadError::from(UnsupportedDestination("x".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            UploadError::StorageError("disk".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            UploadError::Forward(ForwardError::Timeout(std::time::Duration::from_secs(1)))
                .status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_forward_error_keeps_backend_text() {
        let err = UploadError::from(ForwardError::Rejected {
            status: 412,
            body: "Missing reqtype".into(),
        });
        let message = err.to_string();
        assert!(message.contains("412"));
        assert!(message.contains("Missing reqtype"));
    }
}
