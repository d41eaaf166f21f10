//! Error taxonomy for the retrieval and resolution core.
//!
//! Chunk- and source-level failures are isolated and aggregated by the
//! indexer; resolver failures on the command path are fatal to that turn,
//! while content-path failures degrade to the no-augmentation path.

use thiserror::Error;

/// Embedding backend failure. Never produces partial or zero-vector
/// substitutes; the caller either gets every vector or an error.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding backend unreachable: {0}")]
    Backend(String),

    #[error("embedding request timed out after {0}s")]
    Timeout(u64),

    #[error("embedding backend returned {actual} vectors for {expected} inputs")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Vector index failure. Fatal for the operation that hit it; never
/// silently migrated or retried inside the client.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error(
        "collection '{name}' exists with dimension {existing_dim} metric {existing_metric}, \
         requested dimension {requested_dim} metric {requested_metric}"
    )]
    SchemaMismatch {
        name: String,
        existing_dim: usize,
        existing_metric: String,
        requested_dim: usize,
        requested_metric: String,
    },

    #[error("vector for '{chunk_id}' has {actual} dims, collection '{collection}' expects {expected}")]
    DimensionMismatch {
        collection: String,
        chunk_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("collection '{collection}' holds model '{existing}', refusing to mix in '{offered}'")]
    ModelVersionMismatch {
        collection: String,
        existing: String,
        offered: String,
    },

    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    #[error("index database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// A source that could not be chunked. Skipped and counted in the sync
/// summary, never fatal to the batch.
#[derive(Error, Debug)]
pub enum ChunkSourceError {
    #[error("unreadable source {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("binary source skipped: {0}")]
    Binary(String),
}

/// Turn resolution failure.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("empty input")]
    EmptyInput,

    #[error("no command matched '{0}'")]
    NoCommandMatch(String),

    #[error("retrieval timed out after {0}s")]
    Timeout(u64),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Session log failure. Always surfaced; a turn the user believes was
/// saved must never be silently lost.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session '{0}' has no turns")]
    Empty(String),

    #[error("session database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("corrupt resolution record for session '{session}' seq {seq}: {reason}")]
    CorruptRecord {
        session: String,
        seq: i64,
        reason: String,
    },
}
