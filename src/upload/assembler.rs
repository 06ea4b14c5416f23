//! Chunk assembler - concatenates a session's chunks into one artifact

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;

use super::artifact::Artifact;
use super::chunk_store::ChunkStore;
use super::types::UploadError;

/// Builds artifacts out of stored chunks
#[derive(Debug, Clone)]
pub struct Assembler {
    chunk_store: ChunkStore,
    temp_dir: PathBuf,
}

impl Assembler {
    pub fn new(chunk_store: ChunkStore, temp_dir: PathBuf) -> Self {
        Self {
            chunk_store,
            temp_dir,
        }
    }

    /// Concatenate every chunk of `upload_id`, in index order, into a new
    /// artifact named after `filename`.
    ///
    /// Only chunks already on disk are used. On failure the partial
    /// artifact is deleted and never returned. The session itself is left
    /// in place; removing it is up to the caller.
    pub async fn assemble(&self, upload_id: &str, filename: &str) -> Result<Artifact, UploadError> {
        let chunks = self.chunk_store.list_chunks(upload_id).await?;
        if chunks.is_empty() {
            return Err(UploadError::NoChunks(upload_id.to_string()));
        }

        if let Some(odd) = chunks.iter().find(|c| c.index.is_none()) {
            tracing::warn!(
                upload_id = %upload_id,
                index = %odd.label,
                "Chunk index is not a number, appending after numbered chunks"
            );
        }

        tracing::info!(
            upload_id = %upload_id,
            chunks = chunks.len(),
            "Reassembling chunks"
        );

        let (artifact, mut out) = Artifact::create(&self.temp_dir, filename)
            .await
            .map_err(|e| UploadError::AssemblyError(format!("failed to create final file: {}", e)))?;

        let mut total = 0u64;
        for chunk in &chunks {
            let mut input = tokio::fs::File::open(&chunk.path).await.map_err(|e| {
                UploadError::AssemblyError(format!(
                    "error opening chunk {} for reading: {}",
                    chunk.label, e
                ))
            })?;
            total += tokio::io::copy(&mut input, &mut out).await.map_err(|e| {
                UploadError::AssemblyError(format!(
                    "error writing chunk {} to final file: {}",
                    chunk.label, e
                ))
            })?;
        }

        out.flush()
            .await
            .map_err(|e| UploadError::AssemblyError(format!("failed to flush final file: {}", e)))?;
        drop(out);

        tracing::info!(
            upload_id = %upload_id,
            path = %artifact.path().display(),
            size = total,
            "Assembled file ready"
        );

        Ok(artifact)
    }
}
