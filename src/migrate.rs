use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema. Every statement is idempotent, so `parley init` can
/// be run any number of times.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Vector collections. model_version is set by the first upsert and
    // pinned from then on.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            dimension INTEGER NOT NULL,
            metric TEXT NOT NULL,
            model_version TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per embedded chunk.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vectors (
            collection TEXT NOT NULL,
            chunk_id TEXT NOT NULL,
            source_ref TEXT NOT NULL,
            text TEXT NOT NULL,
            modified_at INTEGER NOT NULL,
            model_version TEXT NOT NULL,
            embedding BLOB NOT NULL,
            PRIMARY KEY (collection, chunk_id),
            FOREIGN KEY (collection) REFERENCES collections(name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Change-detection side table: chunk_id -> last-seen content hash.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_hashes (
            collection TEXT NOT NULL,
            chunk_id TEXT NOT NULL,
            hash TEXT NOT NULL,
            PRIMARY KEY (collection, chunk_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Small key/value table for sync bookkeeping (catalog hash).
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only chat turn log.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS turns (
            session_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            role TEXT NOT NULL,
            text TEXT NOT NULL,
            resolution_json TEXT,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (session_id, seq)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_collection ON vectors(collection)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(session_id, seq)")
        .execute(pool)
        .await?;

    Ok(())
}
