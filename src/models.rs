//! Core data models used throughout Parley.
//!
//! These types represent the chunks, query results, resolutions, and chat
//! turns that flow through the indexing and resolution pipeline.

use serde::{Deserialize, Serialize};

/// Which logical collection a chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Content,
    Command,
}

impl ChunkKind {
    /// The vector collection this kind of chunk is written to.
    pub fn collection(&self) -> &'static str {
        match self {
            ChunkKind::Content => "content",
            ChunkKind::Command => "commands",
        }
    }
}

/// A retrievable unit of text derived from a source file or a command
/// description.
///
/// `id` is deterministic (SHA-256 over source reference and start offset),
/// so re-chunking unmodified input produces the same ids and upserts
/// instead of duplicating.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    /// `"<relative path>:<start>-<end>"` for content, `"command:<name>"`
    /// for commands.
    pub source_ref: String,
    pub text: String,
    pub kind: ChunkKind,
    /// Source modification time (epoch seconds); first ranking tie-break.
    /// Zero for command chunks.
    pub modified_at: i64,
}

/// One ranked item returned from a similarity query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryHit {
    pub chunk_id: String,
    pub score: f32,
    pub source_ref: String,
    pub text: String,
    pub modified_at: i64,
}

/// The outcome of resolving one user turn. Exactly one variant is produced
/// per turn, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// The turn was recognized as a command invocation.
    Command { name: String, raw_args: String },
    /// The turn is conversation; `items` is the ranked context bundle
    /// (possibly empty) selected for prompt augmentation.
    Context {
        items: Vec<QueryHit>,
        budget_used: usize,
    },
}

/// Speaker role for a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A single chat turn as persisted in the session log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    /// The resolution that produced this turn's prompt, if any. Assistant
    /// and system turns carry `None`.
    pub resolution: Option<Resolution>,
    pub created_at: i64,
}

impl Turn {
    pub fn user(text: String, resolution: Resolution) -> Self {
        Self {
            role: Role::User,
            text,
            resolution: Some(resolution),
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn assistant(text: String) -> Self {
        Self {
            role: Role::Assistant,
            text,
            resolution: None,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn system(text: String) -> Self {
        Self {
            role: Role::System,
            text,
            resolution: None,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Counters reported by one indexer sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub added: u64,
    pub updated: u64,
    pub removed: u64,
    pub skipped: u64,
}

impl SyncSummary {
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0
    }
}
