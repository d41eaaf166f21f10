//! Indexing pipeline orchestration.
//!
//! Coordinates the full sync flow: walk sources → chunk → hash-gate →
//! embed → upsert, for both the content corpus and the command catalog.
//!
//! The hash gate is the efficiency core: each chunk's SHA-256 text hash is
//! compared against the `chunk_hashes` side table, and only missing or
//! stale chunks are embedded. A sync over an unchanged corpus issues zero
//! embedding calls. Chunks whose source vanished are deleted.
//!
//! Sync may run while queries are in flight. Each upsert is atomic, but
//! cross-chunk consistency during a sync is deliberately relaxed — queries
//! may transiently see a mix of old and new chunks.

use std::collections::{HashMap, HashSet};

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sqlx::SqlitePool;
use walkdir::WalkDir;

use crate::catalog::CommandCatalog;
use crate::chunker::{self, hash_text};
use crate::config::Config;
use crate::embedder::Embedder;
use crate::error::ChunkSourceError;
use crate::index::IndexClient;
use crate::models::{Chunk, ChunkKind, SyncSummary};

const CATALOG_HASH_KEY: &str = "catalog_hash";

pub struct Indexer<'a> {
    pool: &'a SqlitePool,
    index: &'a IndexClient,
    embedder: &'a dyn Embedder,
    config: &'a Config,
}

impl<'a> Indexer<'a> {
    pub fn new(
        pool: &'a SqlitePool,
        index: &'a IndexClient,
        embedder: &'a dyn Embedder,
        config: &'a Config,
    ) -> Self {
        Self {
            pool,
            index,
            embedder,
            config,
        }
    }

    /// Sync the configured content roots into the `content` collection.
    pub async fn sync_content(&self) -> Result<SyncSummary> {
        let collection = ChunkKind::Content.collection();
        self.index
            .ensure_collection(collection, self.embedder.dims(), &self.config.embedding.metric)
            .await?;

        let (chunks, unreadable) = scan_roots(self.config)?;
        let mut summary = self.sync_chunks(collection, chunks, false).await?;
        summary.skipped += unreadable;
        Ok(summary)
    }

    /// Sync the command catalog into the `commands` collection. The
    /// catalog hash gates the whole run: an unchanged catalog issues zero
    /// embedding calls.
    pub async fn sync_commands(&self, catalog: &CommandCatalog) -> Result<SyncSummary> {
        let collection = ChunkKind::Command.collection();
        self.index
            .ensure_collection(collection, self.embedder.dims(), &self.config.embedding.metric)
            .await?;

        if get_meta(self.pool, CATALOG_HASH_KEY).await?.as_deref() == Some(catalog.hash()) {
            return Ok(SyncSummary {
                skipped: catalog.len() as u64,
                ..Default::default()
            });
        }

        // Catalog embedding failures are fatal, unlike content batches.
        let summary = self.sync_chunks(collection, catalog.chunks(), true).await?;
        set_meta(self.pool, CATALOG_HASH_KEY, catalog.hash()).await?;
        Ok(summary)
    }

    /// Shared incremental sync over one collection's desired chunk set.
    async fn sync_chunks(
        &self,
        collection: &str,
        chunks: Vec<Chunk>,
        embed_errors_fatal: bool,
    ) -> Result<SyncSummary> {
        let known = load_hashes(self.pool, collection).await?;
        let current_ids: HashSet<&str> = chunks.iter().map(|c| c.id.as_str()).collect();

        let mut summary = SyncSummary::default();
        let mut pending: Vec<(&Chunk, String, bool)> = Vec::new();

        for chunk in &chunks {
            let text_hash = hash_text(&chunk.text);
            match known.get(chunk.id.as_str()) {
                Some(existing) if *existing == text_hash => summary.skipped += 1,
                Some(_) => pending.push((chunk, text_hash, false)),
                None => pending.push((chunk, text_hash, true)),
            }
        }

        let model = self.embedder.model_name().to_string();
        for batch in pending.chunks(self.config.embedding.batch_size) {
            let texts: Vec<String> = batch.iter().map(|(c, _, _)| c.text.clone()).collect();

            match self.embedder.embed(&texts).await {
                Ok(vectors) => {
                    for ((chunk, text_hash, is_new), vector) in batch.iter().zip(vectors.iter()) {
                        self.index.upsert(collection, chunk, vector, &model).await?;
                        store_hash(self.pool, collection, &chunk.id, text_hash).await?;
                        if *is_new {
                            summary.added += 1;
                        } else {
                            summary.updated += 1;
                        }
                    }
                }
                Err(e) if !embed_errors_fatal => {
                    // Not recorded in chunk_hashes, so the next sync
                    // retries these chunks.
                    eprintln!("Warning: embedding batch failed: {}", e);
                    summary.skipped += batch.len() as u64;
                }
                Err(e) => return Err(e.into()),
            }
        }

        for stale_id in known.keys().filter(|id| !current_ids.contains(id.as_str())) {
            self.index.delete(collection, stale_id).await?;
            sqlx::query("DELETE FROM chunk_hashes WHERE collection = ? AND chunk_id = ?")
                .bind(collection)
                .bind(stale_id)
                .execute(self.pool)
                .await?;
            summary.removed += 1;
        }

        Ok(summary)
    }
}

/// Drop every vector, hash, and collection so the next sync re-embeds
/// from scratch. This is the reindex path for embedding-model drift; the
/// index never mixes model versions in place.
pub async fn reset_index(pool: &SqlitePool) -> Result<()> {
    sqlx::query("DELETE FROM vectors").execute(pool).await?;
    sqlx::query("DELETE FROM chunk_hashes").execute(pool).await?;
    sqlx::query("DELETE FROM sync_meta").execute(pool).await?;
    sqlx::query("DELETE FROM collections").execute(pool).await?;
    Ok(())
}

/// Walk the configured roots and chunk every readable text file. Returns
/// the chunks plus a count of sources skipped as unreadable or binary.
fn scan_roots(config: &Config) -> Result<(Vec<Chunk>, u64)> {
    let content = &config.content;
    let include_set = build_globset(&content.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(content.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut chunks = Vec::new();
    let mut skipped = 0u64;

    for root in &content.roots {
        if !root.exists() {
            bail!("content root does not exist: {}", root.display());
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(root).follow_links(content.follow_symlinks);
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().to_string();

            if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
                continue;
            }

            files.push((path.to_path_buf(), rel_str));
        }

        // Deterministic ordering regardless of walk order.
        files.sort_by(|a, b| a.1.cmp(&b.1));

        for (path, rel_str) in files {
            match read_text_source(&path, &rel_str) {
                Ok((text, modified_at)) => {
                    chunks.extend(chunker::chunk_file(&rel_str, &text, modified_at, &config.chunking));
                }
                Err(e) => {
                    eprintln!("Warning: {}", e);
                    skipped += 1;
                }
            }
        }
    }

    Ok((chunks, skipped))
}

fn read_text_source(
    path: &std::path::Path,
    rel_str: &str,
) -> std::result::Result<(String, i64), ChunkSourceError> {
    let bytes = std::fs::read(path).map_err(|e| ChunkSourceError::Unreadable {
        path: rel_str.to_string(),
        reason: e.to_string(),
    })?;

    if bytes.contains(&0) {
        return Err(ChunkSourceError::Binary(rel_str.to_string()));
    }

    let text = String::from_utf8(bytes).map_err(|_| ChunkSourceError::Binary(rel_str.to_string()))?;

    let modified_at = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    Ok((text, modified_at))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

async fn load_hashes(pool: &SqlitePool, collection: &str) -> Result<HashMap<String, String>> {
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT chunk_id, hash FROM chunk_hashes WHERE collection = ?")
            .bind(collection)
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().collect())
}

async fn store_hash(pool: &SqlitePool, collection: &str, chunk_id: &str, hash: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO chunk_hashes (collection, chunk_id, hash) VALUES (?, ?, ?)
        ON CONFLICT(collection, chunk_id) DO UPDATE SET hash = excluded.hash
        "#,
    )
    .bind(collection)
    .bind(chunk_id)
    .bind(hash)
    .execute(pool)
    .await?;
    Ok(())
}

async fn get_meta(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM sync_meta WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

async fn set_meta(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        r#"
        INSERT INTO sync_meta (key, value, updated_at) VALUES (?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(value)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}
