//! Upload pipeline
//!
//! Per request: `Received -> (Assembling)? -> Hashing -> CacheLookup`, then
//! either `Done` on a hit or `Forwarding -> CacheStore -> Done` on a miss.
//! Non-cacheable destinations go straight from `Received`/`Assembling` to
//! `Forwarding`. Any stage may end in failure; the artifact is dropped,
//! and so deleted, whichever way the request ends.

use std::fmt;

use crate::dedup::{DedupCache, DedupError};
use crate::forward::Forwarder;
use crate::upload::{hash_file, Artifact, Assembler, ChunkStore, UploadError, UploadRequest};

/// Where a request is in the pipeline, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Assembling,
    Hashing,
    CacheLookup,
    Forwarding,
    CacheStore,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How the dedup cache took part in a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
    /// Destination is never cached
    Bypassed,
}

/// Successful end of a request.
///
/// A failed cache write does not fail the request; it is reported here.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub url: String,
    pub cache: CacheOutcome,
    pub cache_warning: Option<DedupError>,
}

#[derive(Clone)]
pub struct UploadPipeline {
    chunk_store: ChunkStore,
    assembler: Assembler,
    dedup: DedupCache,
    forwarder: Forwarder,
}

impl UploadPipeline {
    pub fn new(
        chunk_store: ChunkStore,
        assembler: Assembler,
        dedup: DedupCache,
        forwarder: Forwarder,
    ) -> Self {
        Self {
            chunk_store,
            assembler,
            dedup,
            forwarder,
        }
    }

    pub fn chunk_store(&self) -> &ChunkStore {
        &self.chunk_store
    }

    /// Assemble a chunked upload and run it through the pipeline.
    ///
    /// The session's chunks are removed once assembly has been attempted,
    /// whether it worked or not.
    pub async fn finish_chunked(
        &self,
        upload_id: &str,
        request: UploadRequest,
    ) -> Result<PipelineOutcome, UploadError> {
        tracing::debug!(upload_id = %upload_id, stage = %Stage::Assembling, "Pipeline stage");
        let assembled = self.assembler.assemble(upload_id, &request.filename).await;
        self.discard_session(upload_id).await;

        let artifact = assembled?;
        self.process(artifact, &request).await
    }

    /// Drop whatever chunks a session still has
    pub async fn discard_session(&self, upload_id: &str) {
        if let Err(e) = self.chunk_store.remove_session(upload_id).await {
            tracing::warn!(upload_id = %upload_id, error = %e, "Failed to remove upload session");
        }
    }

    /// Run a finished artifact through hash, cache and forward.
    ///
    /// Takes ownership of the artifact so it is deleted when this returns.
    pub async fn process(
        &self,
        artifact: Artifact,
        request: &UploadRequest,
    ) -> Result<PipelineOutcome, UploadError> {
        let destination = request.destination;
        tracing::debug!(destination = %destination, stage = %Stage::Received, "Pipeline stage");

        if !destination.is_cacheable() {
            tracing::info!(
                destination = %destination,
                "Destination is not cached, proceeding with direct upload"
            );
            let url = self.forward(&artifact, request).await?;
            tracing::info!(destination = %destination, url = %url, stage = %Stage::Done, "Uploaded");
            return Ok(PipelineOutcome {
                url,
                cache: CacheOutcome::Bypassed,
                cache_warning: None,
            });
        }

        tracing::debug!(destination = %destination, stage = %Stage::Hashing, "Pipeline stage");
        let fingerprint = hash_file(artifact.path()).await.map_err(|e| {
            UploadError::StorageError(format!("Failed to calculate file hash: {}", e))
        })?;

        tracing::debug!(hash = %fingerprint.short(), stage = %Stage::CacheLookup, "Pipeline stage");
        if let Some(url) = self.dedup.lookup(&fingerprint, destination).await? {
            tracing::info!(
                hash = %fingerprint.short(),
                destination = %destination,
                stage = %Stage::Done,
                "Cache hit, returning stored URL"
            );
            return Ok(PipelineOutcome {
                url,
                cache: CacheOutcome::Hit,
                cache_warning: None,
            });
        }

        tracing::info!(
            hash = %fingerprint.short(),
            destination = %destination,
            "Cache miss, uploading"
        );
        let url = self.forward(&artifact, request).await?;

        tracing::debug!(hash = %fingerprint.short(), stage = %Stage::CacheStore, "Pipeline stage");
        let cache_warning = match self.dedup.record(&fingerprint, destination, &url).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(
                    hash = %fingerprint.short(),
                    destination = %destination,
                    error = %e,
                    "Failed to store hash in database"
                );
                Some(e)
            }
        };

        tracing::info!(destination = %destination, url = %url, stage = %Stage::Done, "Uploaded");
        Ok(PipelineOutcome {
            url,
            cache: CacheOutcome::Miss,
            cache_warning,
        })
    }

    async fn forward(&self, artifact: &Artifact, request: &UploadRequest) -> Result<String, UploadError> {
        tracing::debug!(
            destination = %request.destination,
            stage = %Stage::Forwarding,
            "Pipeline stage"
        );
        self.forwarder
            .forward(
                request.destination,
                artifact.path(),
                &request.filename,
                &request.options,
            )
            .await
            .map_err(|e| {
                tracing::error!(destination = %request.destination, error = %e, "Upload error");
                UploadError::Forward(e)
            })
    }
}
