use sqlx::SqlitePool;

use crate::error::Result;

/// Bumped whenever the artifact layout changes. Older artifacts fail to load
/// and are rebuilt.
pub const FORMAT_VERSION: u32 = 2;

/// Create the artifact schema in a freshly created database.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per chunk; `position` is the chunk's slot in the index.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            position INTEGER PRIMARY KEY,
            source TEXT NOT NULL,
            page INTEGER,
            seq INTEGER NOT NULL,
            start_char INTEGER NOT NULL,
            char_len INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            vector BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source)")
        .execute(pool)
        .await?;

    // Digest of the file each source's chunks were extracted from.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            source TEXT PRIMARY KEY,
            digest TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
