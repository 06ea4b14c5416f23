//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::dedup::{DedupCache, SqliteDedupStore};
use crate::forward::Forwarder;
use crate::pipeline::UploadPipeline;
use crate::upload::{Assembler, ChunkStore};

/// Error type for state initialization
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pub config: Config,
    pub db: SqlitePool,
    pub http: reqwest::Client,
    pub pipeline: UploadPipeline,
}

impl AppState {
    /// Create a new application state
    ///
    /// The pool must already be connected with its schema in place; the
    /// state owns it from here on and closes it in `shutdown`.
    pub fn new(config: Config, db: SqlitePool) -> Result<Self, StateError> {
        let http = reqwest::Client::builder()
            .timeout(config.forward.timeout())
            .build()?;

        let chunk_store = ChunkStore::new(config.storage.uploads_dir.clone());
        let assembler = Assembler::new(chunk_store.clone(), config.storage.temp_dir.clone());
        let dedup = DedupCache::new(Arc::new(SqliteDedupStore::new(db.clone())));
        let forwarder = Forwarder::new(
            http.clone(),
            config.backends.clone(),
            config.forward.timeout(),
        );
        let pipeline = UploadPipeline::new(chunk_store, assembler, dedup, forwarder);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                http,
                pipeline,
            }),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    /// HTTP client shared by forwarding and download passthrough
    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    /// Get the upload pipeline
    pub fn pipeline(&self) -> &UploadPipeline {
        &self.inner.pipeline
    }

    /// Close the database pool
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down application state...");
        self.inner.db.close().await;
    }
}
