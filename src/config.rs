use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::catalog::CommandDescriptor;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default = "default_commands")]
    pub commands: Vec<CommandDescriptor>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_window_lines")]
    pub window_lines: usize,
    #[serde(default = "default_overlap_lines")]
    pub overlap_lines: usize,
    /// How far past the window a chunk may grow to finish an open
    /// brace-delimited block before falling back to a hard cut.
    #[serde(default = "default_max_extend_lines")]
    pub max_extend_lines: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_lines: default_window_lines(),
            overlap_lines: default_overlap_lines(),
            max_extend_lines: default_max_extend_lines(),
        }
    }
}

fn default_window_lines() -> usize {
    60
}
fn default_overlap_lines() -> usize {
    10
}
fn default_max_extend_lines() -> usize {
    40
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResolverConfig {
    /// Minimum top score for a command match.
    #[serde(default = "default_command_threshold")]
    pub command_threshold: f32,
    /// Minimum gap between the best and second-best command score.
    #[serde(default = "default_margin")]
    pub margin: f32,
    /// Minimum score for a chunk to enter the context bundle.
    #[serde(default = "default_content_threshold")]
    pub content_threshold: f32,
    #[serde(default = "default_k_cmd")]
    pub k_cmd: usize,
    #[serde(default = "default_k_ctx")]
    pub k_ctx: usize,
    /// Character budget for the context bundle; items that do not fit are
    /// dropped whole from the tail.
    #[serde(default = "default_context_budget_chars")]
    pub context_budget_chars: usize,
    #[serde(default = "default_resolver_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            command_threshold: default_command_threshold(),
            margin: default_margin(),
            content_threshold: default_content_threshold(),
            k_cmd: default_k_cmd(),
            k_ctx: default_k_ctx(),
            context_budget_chars: default_context_budget_chars(),
            timeout_secs: default_resolver_timeout_secs(),
        }
    }
}

fn default_command_threshold() -> f32 {
    0.75
}
fn default_margin() -> f32 {
    0.05
}
fn default_content_threshold() -> f32 {
    0.30
}
fn default_k_cmd() -> usize {
    3
}
fn default_k_ctx() -> usize {
    8
}
fn default_context_budget_chars() -> usize {
    4000
}
fn default_resolver_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible embeddings endpoint of the local backend.
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dims")]
    pub dims: usize,
    /// Similarity metric for collections created with this model.
    #[serde(default = "default_metric")]
    pub metric: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_embedding_endpoint(),
            model: default_embedding_model(),
            dims: default_embedding_dims(),
            metric: default_metric(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_embedding_endpoint() -> String {
    "http://127.0.0.1:8080/v1/embeddings".to_string()
}
fn default_embedding_model() -> String {
    "bge-large-en-v1.5".to_string()
}
fn default_embedding_dims() -> usize {
    1024
}
fn default_metric() -> String {
    "cosine".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Completion endpoint of the local LLM server.
    #[serde(default = "default_chat_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
    /// Run a background content sync when an interactive chat starts.
    #[serde(default)]
    pub sync_on_start: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: default_chat_endpoint(),
            system_prompt: default_system_prompt(),
            timeout_secs: default_chat_timeout_secs(),
            sync_on_start: false,
        }
    }
}

fn default_chat_endpoint() -> String {
    "http://127.0.0.1:8000/generate".to_string()
}
fn default_system_prompt() -> String {
    "You are a helpful assistant.".to_string()
}
fn default_chat_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ContentConfig {
    #[serde(default)]
    pub roots: Vec<PathBuf>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.md".to_string(),
        "**/*.txt".to_string(),
        "**/*.rs".to_string(),
        "**/*.py".to_string(),
    ]
}

/// The built-in catalog. Overridden entirely when the config file carries
/// its own `[[commands]]` tables.
fn default_commands() -> Vec<CommandDescriptor> {
    vec![
        CommandDescriptor {
            name: "retry".to_string(),
            description: "delete the last assistant response and regenerate it again, \
                          or retry the last response"
                .to_string(),
            handler_ref: "builtin.retry".to_string(),
        },
        CommandDescriptor {
            name: "hint".to_string(),
            description: "add a message in the system role, further clarifying how the \
                          assistant should behave, or providing a suggestion for future \
                          responses"
                .to_string(),
            handler_ref: "builtin.hint".to_string(),
        },
        CommandDescriptor {
            name: "system".to_string(),
            description: "overwrite the system prompt with a new one".to_string(),
            handler_ref: "builtin.system".to_string(),
        },
    ]
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.window_lines == 0 {
        anyhow::bail!("chunking.window_lines must be > 0");
    }
    if config.chunking.overlap_lines >= config.chunking.window_lines {
        anyhow::bail!("chunking.overlap_lines must be < chunking.window_lines");
    }

    if config.resolver.k_cmd == 0 || config.resolver.k_ctx == 0 {
        anyhow::bail!("resolver.k_cmd and resolver.k_ctx must be >= 1");
    }
    if config.resolver.margin < 0.0 {
        anyhow::bail!("resolver.margin must be >= 0");
    }
    if config.resolver.context_budget_chars == 0 {
        anyhow::bail!("resolver.context_budget_chars must be > 0");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    match config.embedding.metric.as_str() {
        "cosine" | "dot" => {}
        other => anyhow::bail!("Unknown similarity metric: '{}'. Must be cosine or dot.", other),
    }

    let mut seen = std::collections::BTreeSet::new();
    for cmd in &config.commands {
        if cmd.name.trim().is_empty() {
            anyhow::bail!("command with empty name in [[commands]]");
        }
        if !seen.insert(cmd.name.as_str()) {
            anyhow::bail!("duplicate command name: '{}'", cmd.name);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config: Config = toml::from_str("[db]\npath = \"/tmp/parley.sqlite\"\n").unwrap();
        validate(&config).unwrap();
        assert_eq!(config.resolver.k_cmd, 3);
        assert_eq!(config.embedding.metric, "cosine");
        assert_eq!(config.commands.len(), 3);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_window() {
        let config: Config = toml::from_str(
            "[db]\npath = \"/tmp/parley.sqlite\"\n[chunking]\nwindow_lines = 10\noverlap_lines = 10\n",
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_unknown_metric() {
        let config: Config = toml::from_str(
            "[db]\npath = \"/tmp/parley.sqlite\"\n[embedding]\nmetric = \"euclidean\"\n",
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_duplicate_commands() {
        let config: Config = toml::from_str(
            r#"
[db]
path = "/tmp/parley.sqlite"

[[commands]]
name = "retry"
description = "one"
handler_ref = "a"

[[commands]]
name = "retry"
description = "two"
handler_ref = "b"
"#,
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }
}
