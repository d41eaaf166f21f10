//! Turn resolution: command invocation or context bundle.
//!
//! One user turn flows through: normalize → embed once → command probe →
//! content probe. The command probe selects a command only when the top
//! score clears `command_threshold` AND beats the runner-up by `margin`;
//! ambiguity is resolved deterministically by that rule, never surfaced.
//!
//! Failure policy differs per path: the command path surfaces retrieval
//! errors, while the content path degrades to the no-augmentation path so
//! a retrieval outage never blocks the conversation.

use std::time::Duration;

use tokio::time::timeout;

use crate::config::ResolverConfig;
use crate::embedder::{embed_query, Embedder};
use crate::error::ResolveError;
use crate::index::IndexClient;
use crate::models::{ChunkKind, QueryHit, Resolution};

const COMMAND_REF_PREFIX: &str = "command:";

pub struct Resolver<'a> {
    embedder: &'a dyn Embedder,
    index: &'a IndexClient,
    config: &'a ResolverConfig,
}

impl<'a> Resolver<'a> {
    pub fn new(embedder: &'a dyn Embedder, index: &'a IndexClient, config: &'a ResolverConfig) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    /// Resolve one raw user turn. Produces exactly one [`Resolution`].
    pub async fn resolve(&self, raw: &str) -> Result<Resolution, ResolveError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ResolveError::EmptyInput);
        }

        // A leading slash-token is explicit command intent: the token is
        // what gets matched, the remainder becomes raw_args, and a miss
        // is an error rather than a fallthrough to conversation.
        let (explicit, probe_text, raw_args) = match trimmed.strip_prefix('/') {
            Some(rest) => {
                let rest = rest.trim_start();
                let token = rest.split_whitespace().next().unwrap_or("");
                if token.is_empty() {
                    return Err(ResolveError::EmptyInput);
                }
                let args = rest[token.len()..].trim().to_string();
                (true, token.to_string(), args)
            }
            None => (false, trimmed.to_string(), trimmed.to_string()),
        };

        // Empty catalog: skip the command probe. Unreachable catalog:
        // error, even for implicit intent.
        let commands = ChunkKind::Command.collection();
        let catalog_size = self.index.count(commands).await?;

        if explicit && catalog_size == 0 {
            return Err(ResolveError::NoCommandMatch(probe_text));
        }

        let query_vec = match self.bounded(embed_query(self.embedder, &probe_text)).await {
            Ok(Ok(vec)) => vec,
            Ok(Err(e)) => {
                if explicit || catalog_size > 0 {
                    return Err(e.into());
                }
                eprintln!("Warning: embedding failed, continuing without retrieval: {}", e);
                return Ok(empty_bundle());
            }
            Err(_) => {
                if explicit || catalog_size > 0 {
                    return Err(ResolveError::Timeout(self.config.timeout_secs));
                }
                eprintln!("Warning: embedding timed out, continuing without retrieval");
                return Ok(empty_bundle());
            }
        };

        if catalog_size > 0 {
            let hits = match self
                .bounded(self.index.query(commands, &query_vec, self.config.k_cmd))
                .await
            {
                Ok(Ok(hits)) => hits,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(ResolveError::Timeout(self.config.timeout_secs)),
            };

            if let Some(name) = pick_command(&hits, self.config) {
                return Ok(Resolution::Command { name, raw_args });
            }
            if explicit {
                return Err(ResolveError::NoCommandMatch(probe_text));
            }
        }

        Ok(self.content_probe(&query_vec).await)
    }

    /// Content probe with graceful degradation: any retrieval failure
    /// yields an empty bundle, never an error.
    async fn content_probe(&self, query_vec: &[f32]) -> Resolution {
        let content = ChunkKind::Content.collection();
        let hits = match self.bounded(self.index.query(content, query_vec, self.config.k_ctx)).await {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                eprintln!("Warning: content retrieval failed: {}", e);
                return empty_bundle();
            }
            Err(_) => {
                eprintln!("Warning: content retrieval timed out");
                return empty_bundle();
            }
        };

        let mut items = Vec::new();
        let mut budget_used = 0usize;

        for hit in hits {
            if hit.score < self.config.content_threshold {
                break;
            }
            // Items that do not fit are dropped whole from the tail,
            // never truncated mid-item.
            if budget_used + hit.text.len() > self.config.context_budget_chars {
                break;
            }
            budget_used += hit.text.len();
            items.push(hit);
        }

        Resolution::Context { items, budget_used }
    }

    async fn bounded<F, T>(&self, fut: F) -> Result<T, tokio::time::error::Elapsed>
    where
        F: std::future::Future<Output = T>,
    {
        timeout(Duration::from_secs(self.config.timeout_secs), fut).await
    }
}

/// The threshold-and-margin rule: a command wins only when the top score
/// clears the threshold and beats the runner-up by at least the margin.
fn pick_command(hits: &[QueryHit], config: &ResolverConfig) -> Option<String> {
    let top = hits.first()?;
    if top.score < config.command_threshold {
        return None;
    }
    if let Some(second) = hits.get(1) {
        if top.score - second.score < config.margin {
            return None;
        }
    }
    top.source_ref
        .strip_prefix(COMMAND_REF_PREFIX)
        .map(|name| name.to_string())
}

fn empty_bundle() -> Resolution {
    Resolution::Context {
        items: Vec::new(),
        budget_used: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(chunk_id: &str, score: f32) -> QueryHit {
        QueryHit {
            chunk_id: chunk_id.to_string(),
            score,
            source_ref: format!("command:{}", chunk_id),
            text: String::new(),
            modified_at: 0,
        }
    }

    fn resolver_config(threshold: f32, margin: f32) -> ResolverConfig {
        ResolverConfig {
            command_threshold: threshold,
            margin,
            ..Default::default()
        }
    }

    #[test]
    fn test_top_below_threshold_is_no_match() {
        let config = resolver_config(0.75, 0.05);
        assert_eq!(
            pick_command(&[hit("summarize", 0.70), hit("translate", 0.40)], &config),
            None
        );
    }

    #[test]
    fn test_clear_winner_selected() {
        let config = resolver_config(0.75, 0.05);
        assert_eq!(
            pick_command(&[hit("summarize", 0.88), hit("translate", 0.55)], &config),
            Some("summarize".to_string())
        );
    }

    #[test]
    fn test_ambiguous_tie_rejected_by_margin() {
        let config = resolver_config(0.75, 0.05);
        assert_eq!(
            pick_command(&[hit("summarize", 0.88), hit("translate", 0.86)], &config),
            None
        );
    }

    #[test]
    fn test_single_hit_needs_no_margin() {
        let config = resolver_config(0.75, 0.05);
        assert_eq!(
            pick_command(&[hit("summarize", 0.80)], &config),
            Some("summarize".to_string())
        );
    }

    #[test]
    fn test_no_hits_is_no_match() {
        let config = resolver_config(0.75, 0.05);
        assert_eq!(pick_command(&[], &config), None);
    }
}
