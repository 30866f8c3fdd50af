use sqlx::SqlitePool;

use crate::error::Result;

/// Create the index tables if they do not exist. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per chunk per build generation
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_entries (
            generation TEXT NOT NULL,
            id TEXT NOT NULL,
            source_id TEXT NOT NULL,
            doc_type TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            overlap INTEGER NOT NULL DEFAULT 0,
            hash TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            PRIMARY KEY (generation, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Key/value metadata; `active_generation` names the published build
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Generations that exist, whether published or still being built
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_generations (
            generation TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL,
            published_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Databases written before generations were tracked
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO index_generations (generation, created_at, published_at)
        SELECT DISTINCT generation, 0, 0 FROM index_entries
        UNION
        SELECT value, 0, 0 FROM index_meta WHERE key = 'active_generation'
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_index_entries_generation ON index_entries(generation)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
