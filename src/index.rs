//! Vector index client.
//!
//! Owns the two vector collections (`content` and `commands`) stored as
//! little-endian f32 BLOBs in SQLite, with similarity computed in Rust.
//! Writes go through one transaction per chunk, so a query never observes
//! a half-written vector; SQLite's single-writer model serializes racing
//! upserts (last writer wins).
//!
//! The indexer is the only writer; the query resolver only reads.

use sqlx::{Row, SqlitePool};

use crate::embedder::{blob_to_vec, cosine_similarity, dot_product, vec_to_blob};
use crate::error::IndexError;
use crate::models::{Chunk, QueryHit};

#[derive(Clone)]
pub struct IndexClient {
    pool: SqlitePool,
}

struct CollectionInfo {
    dimension: usize,
    metric: String,
    model_version: Option<String>,
}

impl IndexClient {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Idempotent collection creation. A collection that already exists
    /// with the same dimension and metric is a no-op; a mismatch is a
    /// fatal configuration error, never a silent migration.
    pub async fn ensure_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: &str,
    ) -> Result<(), IndexError> {
        let existing = sqlx::query("SELECT dimension, metric FROM collections WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = existing {
            let existing_dim: i64 = row.get("dimension");
            let existing_metric: String = row.get("metric");
            if existing_dim as usize != dimension || existing_metric != metric {
                return Err(IndexError::SchemaMismatch {
                    name: name.to_string(),
                    existing_dim: existing_dim as usize,
                    existing_metric,
                    requested_dim: dimension,
                    requested_metric: metric.to_string(),
                });
            }
            return Ok(());
        }

        sqlx::query("INSERT INTO collections (name, dimension, metric) VALUES (?, ?, ?)")
            .bind(name)
            .bind(dimension as i64)
            .bind(metric)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Write one chunk's vector. Atomic: the row and the collection's
    /// pinned model version commit together or not at all.
    pub async fn upsert(
        &self,
        collection: &str,
        chunk: &Chunk,
        vector: &[f32],
        model_version: &str,
    ) -> Result<(), IndexError> {
        let info = self.collection_info(collection).await?;

        if vector.len() != info.dimension {
            return Err(IndexError::DimensionMismatch {
                collection: collection.to_string(),
                chunk_id: chunk.id.clone(),
                expected: info.dimension,
                actual: vector.len(),
            });
        }

        // A collection never mixes model versions; drift requires a
        // reindex.
        if let Some(existing) = &info.model_version {
            if existing != model_version {
                return Err(IndexError::ModelVersionMismatch {
                    collection: collection.to_string(),
                    existing: existing.clone(),
                    offered: model_version.to_string(),
                });
            }
        }

        let mut tx = self.pool.begin().await?;

        if info.model_version.is_none() {
            sqlx::query("UPDATE collections SET model_version = ? WHERE name = ?")
                .bind(model_version)
                .bind(collection)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO vectors (collection, chunk_id, source_ref, text, modified_at, model_version, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(collection, chunk_id) DO UPDATE SET
                source_ref = excluded.source_ref,
                text = excluded.text,
                modified_at = excluded.modified_at,
                model_version = excluded.model_version,
                embedding = excluded.embedding
            "#,
        )
        .bind(collection)
        .bind(&chunk.id)
        .bind(&chunk.source_ref)
        .bind(&chunk.text)
        .bind(chunk.modified_at)
        .bind(model_version)
        .bind(vec_to_blob(vector))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Delete one chunk. Deleting an id that is not present is a no-op.
    pub async fn delete(&self, collection: &str, chunk_id: &str) -> Result<(), IndexError> {
        sqlx::query("DELETE FROM vectors WHERE collection = ? AND chunk_id = ?")
            .bind(collection)
            .bind(chunk_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Similarity query: at most `k` items ranked by the collection's
    /// metric, highest first. Ties break by most-recent source
    /// modification time, then chunk_id lexical order — fully
    /// deterministic.
    pub async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<QueryHit>, IndexError> {
        let info = self.collection_info(collection).await?;

        if vector.len() != info.dimension {
            return Err(IndexError::DimensionMismatch {
                collection: collection.to_string(),
                chunk_id: "<query>".to_string(),
                expected: info.dimension,
                actual: vector.len(),
            });
        }

        let rows = sqlx::query(
            "SELECT chunk_id, source_ref, text, modified_at, embedding FROM vectors WHERE collection = ?",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<QueryHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let stored = blob_to_vec(&blob);
                let score = match info.metric.as_str() {
                    "dot" => dot_product(vector, &stored),
                    _ => cosine_similarity(vector, &stored),
                };
                QueryHit {
                    chunk_id: row.get("chunk_id"),
                    score,
                    source_ref: row.get("source_ref"),
                    text: row.get("text"),
                    modified_at: row.get("modified_at"),
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.modified_at.cmp(&a.modified_at))
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);

        Ok(hits)
    }

    /// Number of vectors in a collection. An unknown collection counts as
    /// empty rather than erroring, so the resolver's empty-catalog edge
    /// case stays an edge case.
    pub async fn count(&self, collection: &str) -> Result<u64, IndexError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vectors WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, IndexError> {
        let row = sqlx::query("SELECT dimension, metric, model_version FROM collections WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| IndexError::UnknownCollection(name.to_string()))?;

        let dimension: i64 = row.get("dimension");
        Ok(CollectionInfo {
            dimension: dimension as usize,
            metric: row.get("metric"),
            model_version: row.get("model_version"),
        })
    }
}
