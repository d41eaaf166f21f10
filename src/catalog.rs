//! The command catalog.
//!
//! Commands are registered once at startup from the config file and passed
//! through the indexer and resolver as an explicit value — there is no
//! ambient global registry. The catalog carries a content hash so the
//! indexer can skip re-embedding when nothing changed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::chunker;
use crate::models::Chunk;

/// A command the user can invoke by semantic intent. The description is
/// what gets embedded; `handler_ref` is resolved by an external dispatcher,
/// never executed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub name: String,
    pub description: String,
    pub handler_ref: String,
}

#[derive(Debug, Clone)]
pub struct CommandCatalog {
    commands: BTreeMap<String, CommandDescriptor>,
    hash: String,
}

impl CommandCatalog {
    pub fn new(descriptors: Vec<CommandDescriptor>) -> Self {
        let commands: BTreeMap<String, CommandDescriptor> = descriptors
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();

        // BTreeMap iteration is name-ordered, so the hash is stable across
        // config reorderings.
        let mut hasher = Sha256::new();
        for (name, d) in &commands {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            hasher.update(d.description.as_bytes());
            hasher.update([b'\n']);
        }
        let hash = format!("{:x}", hasher.finalize());

        Self { commands, hash }
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn get(&self, name: &str) -> Option<&CommandDescriptor> {
        self.commands.get(name)
    }

    /// Content hash over every name and description; drift here is what
    /// triggers a catalog re-embed.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// One embeddable chunk per command.
    pub fn chunks(&self) -> Vec<Chunk> {
        self.commands.values().map(chunker::chunk_command).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, description: &str) -> CommandDescriptor {
        CommandDescriptor {
            name: name.to_string(),
            description: description.to_string(),
            handler_ref: format!("builtin.{}", name),
        }
    }

    #[test]
    fn test_hash_ignores_registration_order() {
        let a = CommandCatalog::new(vec![descriptor("retry", "x"), descriptor("hint", "y")]);
        let b = CommandCatalog::new(vec![descriptor("hint", "y"), descriptor("retry", "x")]);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_hash_tracks_description_changes() {
        let a = CommandCatalog::new(vec![descriptor("retry", "regenerate")]);
        let b = CommandCatalog::new(vec![descriptor("retry", "regenerate the reply")]);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = CommandCatalog::new(vec![]);
        assert!(catalog.is_empty());
        assert!(catalog.chunks().is_empty());
    }

    #[test]
    fn test_chunks_cover_every_command() {
        let catalog = CommandCatalog::new(vec![descriptor("retry", "x"), descriptor("hint", "y")]);
        let chunks = catalog.chunks();
        assert_eq!(chunks.len(), 2);
        let refs: Vec<&str> = chunks.iter().map(|c| c.source_ref.as_str()).collect();
        assert!(refs.contains(&"command:retry"));
        assert!(refs.contains(&"command:hint"));
    }
}
