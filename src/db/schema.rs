//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL)
        .execute(pool)
        .await?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Forwarded uploads by content hash, one URL column per cacheable backend
CREATE TABLE IF NOT EXISTS hash (
    hash CHAR(64) PRIMARY KEY,
    catbox TEXT,
    pomf TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;
