//! Chat orchestration.
//!
//! Thin coordination between the resolver, the session store, and the
//! external completion service: resolve the turn, build the prompt
//! payload, call the model, record the result. Nothing is persisted until
//! the full turn — including its resolution — is determined, so an
//! interrupted turn leaves no partial writes.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::catalog::CommandCatalog;
use crate::config::ChatConfig;
use crate::models::{Resolution, Role, Turn};
use crate::resolver::Resolver;
use crate::session::SessionStore;

/// One message in the completion request payload.
#[derive(Debug, Clone, Serialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    output: String,
    #[allow(dead_code)]
    time: f32,
}

/// HTTP client for the local completion service.
pub struct CompletionClient {
    endpoint: String,
    client: reqwest::Client,
}

impl CompletionClient {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            client,
        })
    }

    pub async fn complete(&self, messages: &[WireMessage]) -> Result<String> {
        let body = serde_json::json!({ "messages": messages });
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("completion service unreachable at {}", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("completion service error {}: {}", status, body_text);
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .context("invalid completion service response")?;
        Ok(parsed.output)
    }
}

/// What one orchestrated turn produced.
#[derive(Debug)]
pub enum TurnOutcome {
    /// Conversation: the assistant's reply, already recorded.
    Reply(String),
    /// A resolved command invocation, recorded and handed back for
    /// dispatch.
    Command { name: String, raw_args: String },
}

pub struct ChatOrchestrator<'a> {
    resolver: &'a Resolver<'a>,
    store: &'a SessionStore,
    completion: &'a CompletionClient,
    catalog: &'a CommandCatalog,
}

impl<'a> ChatOrchestrator<'a> {
    pub fn new(
        resolver: &'a Resolver<'a>,
        store: &'a SessionStore,
        completion: &'a CompletionClient,
        catalog: &'a CommandCatalog,
    ) -> Self {
        Self {
            resolver,
            store,
            completion,
            catalog,
        }
    }

    /// Seed a new session with the configured system prompt.
    pub async fn ensure_session(&self, session_id: &str, system_prompt: &str) -> Result<()> {
        if self.store.load(session_id).await?.is_empty() {
            self.store
                .append(session_id, &Turn::system(system_prompt.to_string()))
                .await?;
        }
        Ok(())
    }

    /// Run one user turn end to end.
    pub async fn run_turn(&self, session_id: &str, user_text: &str) -> Result<TurnOutcome> {
        let resolution = self.resolver.resolve(user_text).await?;

        match resolution {
            // Command turns are recorded by dispatch: retry has to drop
            // the previous assistant turn first, and only the last turn
            // can be deleted.
            Resolution::Command { name, raw_args } => Ok(TurnOutcome::Command { name, raw_args }),
            bundle @ Resolution::Context { .. } => {
                let history = self.store.load(session_id).await?;
                let mut messages = render_history(&history);
                push_turn_messages(&mut messages, user_text, Some(&bundle));

                let output = self.completion.complete(&messages).await?;

                self.store
                    .append(session_id, &Turn::user(user_text.to_string(), bundle))
                    .await?;
                self.store
                    .append(session_id, &Turn::assistant(output.clone()))
                    .await?;
                Ok(TurnOutcome::Reply(output))
            }
        }
    }

    /// Execute one of the built-in command handlers, recording the
    /// command turn alongside its effects. Returns the new assistant
    /// reply when the command regenerated one.
    pub async fn dispatch(
        &self,
        session_id: &str,
        user_text: &str,
        name: &str,
        raw_args: &str,
    ) -> Result<Option<String>> {
        let descriptor = self
            .catalog
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("command not found: {}", name))?;

        let command_turn = Turn::user(
            user_text.trim().to_string(),
            Resolution::Command {
                name: name.to_string(),
                raw_args: raw_args.to_string(),
            },
        );

        match descriptor.handler_ref.as_str() {
            "builtin.retry" => {
                let history = self.store.load(session_id).await?;
                match history.last() {
                    Some(turn) if turn.role == Role::Assistant => {}
                    _ => bail!("nothing to retry: last turn is not an assistant response"),
                }
                self.store.delete_last(session_id).await?;
                self.store.append(session_id, &command_turn).await?;

                let history = self.store.load(session_id).await?;
                let messages = render_history(&history);
                let output = self.completion.complete(&messages).await?;
                self.store
                    .append(session_id, &Turn::assistant(output.clone()))
                    .await?;
                Ok(Some(output))
            }
            "builtin.hint" => {
                if raw_args.trim().is_empty() {
                    bail!("hint requires text, e.g. `/hint keep answers short`");
                }
                self.store.append(session_id, &command_turn).await?;
                self.store
                    .append(session_id, &Turn::system(raw_args.trim().to_string()))
                    .await?;
                Ok(None)
            }
            "builtin.system" => {
                if raw_args.trim().is_empty() {
                    bail!("system requires the new prompt text");
                }
                // The log is append-only; a later system turn supersedes
                // the seeded prompt in the rendered payload order.
                self.store.append(session_id, &command_turn).await?;
                self.store
                    .append(session_id, &Turn::system(raw_args.trim().to_string()))
                    .await?;
                Ok(None)
            }
            other => {
                self.store.append(session_id, &command_turn).await?;
                bail!("no handler registered for '{}' ({})", name, other)
            }
        }
    }
}

/// Render persisted turns into the completion payload. A user turn that
/// carried a context bundle gets its retrieved context re-injected as the
/// preceding system message, so replay and retry reproduce the original
/// augmentation. Command turns are audit records, not conversation, and
/// are left out of the payload.
pub fn render_history(turns: &[Turn]) -> Vec<WireMessage> {
    let mut messages = Vec::with_capacity(turns.len() + 2);
    for turn in turns {
        match (&turn.role, &turn.resolution) {
            (Role::User, Some(Resolution::Command { .. })) => {}
            (Role::User, Some(resolution)) => {
                push_turn_messages(&mut messages, &turn.text, Some(resolution));
            }
            (role, _) => messages.push(WireMessage {
                role: wire_role(*role).to_string(),
                content: turn.text.clone(),
            }),
        }
    }
    messages
}

/// Append one user turn, preceded by its context message when the bundle
/// is non-empty.
fn push_turn_messages(messages: &mut Vec<WireMessage>, user_text: &str, resolution: Option<&Resolution>) {
    if let Some(Resolution::Context { items, .. }) = resolution {
        if !items.is_empty() {
            let mut content = String::from("Relevant context retrieved from local files:\n");
            for item in items {
                content.push_str(&format!("\n[{}]\n{}\n", item.source_ref, item.text));
            }
            messages.push(WireMessage {
                role: "system".to_string(),
                content,
            });
        }
    }

    messages.push(WireMessage {
        role: "user".to_string(),
        content: user_text.to_string(),
    });
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}
