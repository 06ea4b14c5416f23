//! Deduplication Cache
//!
//! Remembers which public URL a given file content already has on each
//! backend, so identical uploads are only forwarded once.

pub mod sqlite;

pub use sqlite::SqliteDedupStore;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::forward::Destination;
use crate::upload::ContentFingerprint;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DedupError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cannot store URL for uncached destination: {0}")]
    NotCacheable(Destination),
}

// ============================================================================
// Records
// ============================================================================

/// Everything known about one fingerprint. Missing URLs are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    pub fingerprint: ContentFingerprint,
    pub pomf: Option<String>,
    pub catbox: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl CacheRecord {
    /// Record for a fingerprint that has never been stored
    pub fn empty(fingerprint: ContentFingerprint) -> Self {
        Self {
            fingerprint,
            pomf: None,
            catbox: None,
            created_at: None,
        }
    }

    pub fn url_for(&self, destination: Destination) -> Option<&str> {
        match destination {
            Destination::Pomf => self.pomf.as_deref(),
            Destination::Catbox => self.catbox.as_deref(),
            Destination::Litterbox => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pomf.is_none() && self.catbox.is_none()
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// Persistent fingerprint -> URL mapping
#[async_trait::async_trait]
pub trait DedupStore: Send + Sync {
    /// Point lookup; an unknown fingerprint gives an empty record
    async fn lookup(&self, fingerprint: &ContentFingerprint) -> Result<CacheRecord, DedupError>;

    /// Insert or overwrite the URL for (fingerprint, destination)
    async fn upsert(
        &self,
        fingerprint: &ContentFingerprint,
        destination: Destination,
        url: &str,
    ) -> Result<(), DedupError>;
}

// ============================================================================
// Cache Policy
// ============================================================================

/// Cache policy over a `DedupStore`.
///
/// Destinations that are not cacheable never reach the store: lookups miss
/// and writes are skipped. A stored URL is always a hit; there is no expiry
/// and no revalidation against the backend.
#[derive(Clone)]
pub struct DedupCache {
    store: Arc<dyn DedupStore>,
}

impl DedupCache {
    pub fn new(store: Arc<dyn DedupStore>) -> Self {
        Self { store }
    }

    pub async fn lookup(
        &self,
        fingerprint: &ContentFingerprint,
        destination: Destination,
    ) -> Result<Option<String>, DedupError> {
        if !destination.is_cacheable() {
            return Ok(None);
        }
        let record = self.store.lookup(fingerprint).await?;
        Ok(record.url_for(destination).map(str::to_string))
    }

    pub async fn record(
        &self,
        fingerprint: &ContentFingerprint,
        destination: Destination,
        url: &str,
    ) -> Result<(), DedupError> {
        if !destination.is_cacheable() {
            return Ok(());
        }
        self.store.upsert(fingerprint, destination, url).await
    }
}
