//! SQLite-backed dedup store
//!
//! One row per fingerprint in the `hash` table, one nullable column per
//! cacheable destination.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::{CacheRecord, DedupError, DedupStore};
use crate::forward::Destination;
use crate::upload::ContentFingerprint;

const UPSERT_POMF: &str = r#"
    INSERT INTO hash (hash, pomf, created_at, updated_at)
    VALUES (?, ?, ?, ?)
    ON CONFLICT (hash) DO UPDATE SET pomf = excluded.pomf, updated_at = excluded.updated_at
"#;

const UPSERT_CATBOX: &str = r#"
    INSERT INTO hash (hash, catbox, created_at, updated_at)
    VALUES (?, ?, ?, ?)
    ON CONFLICT (hash) DO UPDATE SET catbox = excluded.catbox, updated_at = excluded.updated_at
"#;

#[derive(Clone)]
pub struct SqliteDedupStore {
    db: SqlitePool,
}

impl SqliteDedupStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl DedupStore for SqliteDedupStore {
    async fn lookup(&self, fingerprint: &ContentFingerprint) -> Result<CacheRecord, DedupError> {
        let row = sqlx::query_as::<_, (Option<String>, Option<String>, String)>(
            r#"
            SELECT pomf, catbox, created_at FROM hash WHERE hash = ? LIMIT 1
            "#,
        )
        .bind(fingerprint.to_hex())
        .fetch_optional(&self.db)
        .await?;

        Ok(match row {
            Some((pomf, catbox, created_at)) => CacheRecord {
                fingerprint: *fingerprint,
                pomf,
                catbox,
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .ok()
                    .map(|t| t.with_timezone(&Utc)),
            },
            None => CacheRecord::empty(*fingerprint),
        })
    }

    async fn upsert(
        &self,
        fingerprint: &ContentFingerprint,
        destination: Destination,
        url: &str,
    ) -> Result<(), DedupError> {
        let query = match destination {
            Destination::Pomf => UPSERT_POMF,
            Destination::Catbox => UPSERT_CATBOX,
            Destination::Litterbox => return Err(DedupError::NotCacheable(destination)),
        };
        let now = Utc::now().to_rfc3339();

        sqlx::query(query)
            .bind(fingerprint.to_hex())
            .bind(url)
            .bind(&now)
            .bind(&now)
            .execute(&self.db)
            .await?;

        tracing::debug!(
            hash = %fingerprint.short(),
            destination = %destination,
            "Stored URL for hash"
        );

        Ok(())
    }
}
