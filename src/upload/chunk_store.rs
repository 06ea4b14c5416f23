//! Chunk Store
//!
//! Temporary storage for uploaded chunks before assembly. Every chunk is
//! its own file under `<base>/<upload_id>/chunk_<index>`, so concurrent
//! writes to different indices of one session never touch the same file.
//! Incoming data is first staged as `<base>/.incoming.<uuid>.part`; the
//! leading dot keeps staging files apart from session ids.

use std::fmt;
use std::path::{Path, PathBuf};

use futures::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::types::{validate_token, UploadError, CHUNK_PREFIX};

/// A chunk file found in a session directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkEntry {
    /// Index token as received
    pub label: String,
    /// Numeric index, `None` when the token is not a number
    pub index: Option<i64>,
    pub path: PathBuf,
}

/// Chunk data on disk that has not been placed in a session yet
#[derive(Debug)]
pub struct StagedChunk {
    path: PathBuf,
    size: u64,
}

impl StagedChunk {
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for StagedChunk {
    fn drop(&mut self) {
        // Already renamed when committed
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove staged chunk");
            }
        }
    }
}

/// Local filesystem chunk storage
#[derive(Debug, Clone)]
pub struct ChunkStore {
    base_path: PathBuf,
}

impl ChunkStore {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn session_dir(&self, upload_id: &str) -> PathBuf {
        self.base_path.join(upload_id)
    }

    /// Store a chunk, replacing any earlier chunk with the same index.
    ///
    /// The data is streamed to a hidden staging file and renamed into
    /// place, so a concurrent rewrite of the same index leaves one complete
    /// chunk and memory use does not grow with the chunk size.
    pub async fn put_chunk<S, B, E>(
        &self,
        upload_id: &str,
        index: &str,
        data: S,
    ) -> Result<PathBuf, UploadError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        validate_token("uploadId", upload_id)?;
        validate_token("index", index)?;

        let staged = self.stage_chunk(data).await?;
        self.commit_chunk(staged, upload_id, index).await
    }

    /// Stream chunk data to a staging file before its session and index
    /// are known. The file is removed if the returned value is dropped
    /// without being committed.
    pub async fn stage_chunk<S, B, E>(&self, data: S) -> Result<StagedChunk, UploadError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        tokio::fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| UploadError::StorageError(format!("Failed to create upload directory: {}", e)))?;

        let mut staged = StagedChunk {
            path: self
                .base_path
                .join(format!(".incoming.{}.part", Uuid::new_v4().simple())),
            size: 0,
        };
        let mut file = tokio::fs::File::create(&staged.path)
            .await
            .map_err(|e| UploadError::StorageError(format!("Failed to write chunk to disk: {}", e)))?;

        futures::pin_mut!(data);
        while let Some(piece) = data.next().await {
            let piece = piece.map_err(|e| UploadError::InvalidInput(format!("Invalid form: {}", e)))?;
            file.write_all(piece.as_ref())
                .await
                .map_err(|e| UploadError::StorageError(format!("Failed to write chunk to disk: {}", e)))?;
            staged.size += piece.as_ref().len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| UploadError::StorageError(format!("Failed to write chunk to disk: {}", e)))?;

        Ok(staged)
    }

    /// Move a staged chunk into its session as `chunk_<index>`
    pub async fn commit_chunk(
        &self,
        staged: StagedChunk,
        upload_id: &str,
        index: &str,
    ) -> Result<PathBuf, UploadError> {
        validate_token("uploadId", upload_id)?;
        validate_token("index", index)?;

        let dir = self.session_dir(upload_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| UploadError::StorageError(format!("Failed to create upload directory: {}", e)))?;

        let final_path = dir.join(format!("{}{}", CHUNK_PREFIX, index));
        tokio::fs::rename(&staged.path, &final_path)
            .await
            .map_err(|e| UploadError::StorageError(format!("Failed to write chunk to disk: {}", e)))?;

        tracing::debug!(
            upload_id = %upload_id,
            index = %index,
            size = staged.size,
            "Stored chunk"
        );

        Ok(final_path)
    }

    /// List the chunks of a session in assembly order.
    ///
    /// Numeric indices ascend; entries whose index is not a number keep
    /// their relative order and come last. A missing directory yields an
    /// empty list.
    pub async fn list_chunks(&self, upload_id: &str) -> Result<Vec<ChunkEntry>, UploadError> {
        validate_token("uploadId", upload_id)?;

        let dir = self.session_dir(upload_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(UploadError::StorageError(e.to_string())),
        };

        let mut chunks = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| UploadError::StorageError(e.to_string()))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| UploadError::StorageError(e.to_string()))?;
            if file_type.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(label) = name.strip_prefix(CHUNK_PREFIX) {
                chunks.push(ChunkEntry {
                    label: label.to_string(),
                    index: label.parse().ok(),
                    path: entry.path(),
                });
            }
        }

        // read_dir order is unspecified; settle it before the stable sort
        chunks.sort_by(|a, b| a.label.cmp(&b.label));
        chunks.sort_by_key(|c| (c.index.is_none(), c.index));

        Ok(chunks)
    }

    /// Delete a session directory and everything in it
    pub async fn remove_session(&self, upload_id: &str) -> Result<bool, UploadError> {
        validate_token("uploadId", upload_id)?;

        match tokio::fs::remove_dir_all(self.session_dir(upload_id)).await {
            Ok(()) => {
                tracing::debug!(upload_id = %upload_id, "Removed upload session");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(UploadError::StorageError(e.to_string())),
        }
    }
}

/// Single-piece stream over `data`, for feeding `put_chunk` in tests
#[cfg(test)]
pub(crate) fn chunk_data(data: &[u8]) -> impl Stream<Item = Result<bytes::Bytes, std::io::Error>> {
    futures::stream::iter([Ok(bytes::Bytes::copy_from_slice(data))])
}
