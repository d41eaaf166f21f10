//! Shared test fixtures: a deterministic offline embedder and config/db
//! helpers.
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use sqlx::SqlitePool;

use parley::config::Config;
use parley::error::EmbeddingError;
use parley::embedder::Embedder;

pub const DIMS: usize = 64;

/// Deterministic bag-of-words embedder: each word is FNV-hashed into one
/// of `DIMS` buckets and the vector is L2-normalized. Texts sharing words
/// score high under cosine, which is enough to exercise ranking,
/// thresholds, and the hash gate without a real backend.
pub struct FakeEmbedder {
    calls: AtomicUsize,
    texts_embedded: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            texts_embedded: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn texts_embedded(&self) -> usize {
        self.texts_embedded.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake-bow-v1"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| bow_vector(t)).collect())
    }
}

/// An embedder whose backend is always down.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "fake-bow-v1"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Backend("connection refused".to_string()))
    }
}

pub fn bow_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        // FNV-1a: stable across runs, unlike the std hasher.
        let mut h: u64 = 0xcbf29ce484222325;
        for b in word.bytes() {
            h ^= b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        v[(h % DIMS as u64) as usize] += 1.0;
    }

    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

/// A config pointing at a tempdir, with thresholds calibrated for the
/// bag-of-words embedder's score distribution.
pub fn test_config(root: &Path) -> Config {
    let content = format!(
        r#"
[db]
path = "{root}/data/parley.sqlite"

[chunking]
window_lines = 10
overlap_lines = 2
max_extend_lines = 5

[resolver]
command_threshold = 0.45
margin = 0.05
content_threshold = 0.10
k_cmd = 3
k_ctx = 8
context_budget_chars = 4000
timeout_secs = 5

[embedding]
dims = {dims}
batch_size = 16

[content]
roots = ["{root}/files"]
include_globs = ["**/*.md", "**/*.txt"]
"#,
        root = root.display(),
        dims = DIMS,
    );

    toml::from_str(&content).expect("test config parses")
}

pub async fn setup_db(config: &Config) -> SqlitePool {
    let pool = parley::db::connect(&config.db.path).await.expect("db connect");
    parley::migrate::run_migrations(&pool).await.expect("migrations");
    pool
}
