//! Chat orchestrator tests that stay offline: session seeding and the
//! built-in command handlers that only touch the turn log.

mod common;

use tempfile::TempDir;

use common::{test_config, setup_db, FakeEmbedder};
use parley::catalog::CommandCatalog;
use parley::chat::{ChatOrchestrator, CompletionClient};
use parley::index::IndexClient;
use parley::models::Role;
use parley::resolver::Resolver;
use parley::session::SessionStore;

#[tokio::test]
async fn test_ensure_session_seeds_system_prompt_once() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let pool = setup_db(&config).await;

    let embedder = FakeEmbedder::new();
    let index = IndexClient::new(pool.clone());
    let store = SessionStore::new(pool.clone());
    let completion = CompletionClient::new(&config.chat).unwrap();
    let catalog = CommandCatalog::new(config.commands.clone());
    let resolver = Resolver::new(&embedder, &index, &config.resolver);
    let orchestrator = ChatOrchestrator::new(&resolver, &store, &completion, &catalog);

    orchestrator.ensure_session("s1", "be terse").await.unwrap();
    orchestrator.ensure_session("s1", "be terse").await.unwrap();

    let turns = store.load("s1").await.unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].role, Role::System);
    assert_eq!(turns[0].text, "be terse");
}

#[tokio::test]
async fn test_hint_appends_a_system_turn() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let pool = setup_db(&config).await;

    let embedder = FakeEmbedder::new();
    let index = IndexClient::new(pool.clone());
    let store = SessionStore::new(pool.clone());
    let completion = CompletionClient::new(&config.chat).unwrap();
    let catalog = CommandCatalog::new(config.commands.clone());
    let resolver = Resolver::new(&embedder, &index, &config.resolver);
    let orchestrator = ChatOrchestrator::new(&resolver, &store, &completion, &catalog);

    orchestrator.ensure_session("s1", "prompt").await.unwrap();
    let reply = orchestrator
        .dispatch("s1", "/hint answer in French", "hint", "answer in French")
        .await
        .unwrap();
    assert!(reply.is_none());

    // The command turn is recorded for audit, then the hint itself.
    let turns = store.load("s1").await.unwrap();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[1].role, Role::User);
    assert!(turns[1].resolution.is_some());
    assert_eq!(turns[2].role, Role::System);
    assert_eq!(turns[2].text, "answer in French");
}

#[tokio::test]
async fn test_hint_without_text_errors() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let pool = setup_db(&config).await;

    let embedder = FakeEmbedder::new();
    let index = IndexClient::new(pool.clone());
    let store = SessionStore::new(pool.clone());
    let completion = CompletionClient::new(&config.chat).unwrap();
    let catalog = CommandCatalog::new(config.commands.clone());
    let resolver = Resolver::new(&embedder, &index, &config.resolver);
    let orchestrator = ChatOrchestrator::new(&resolver, &store, &completion, &catalog);

    assert!(orchestrator.dispatch("s1", "/hint", "hint", "  ").await.is_err());
}

#[tokio::test]
async fn test_retry_requires_an_assistant_turn() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let pool = setup_db(&config).await;

    let embedder = FakeEmbedder::new();
    let index = IndexClient::new(pool.clone());
    let store = SessionStore::new(pool.clone());
    let completion = CompletionClient::new(&config.chat).unwrap();
    let catalog = CommandCatalog::new(config.commands.clone());
    let resolver = Resolver::new(&embedder, &index, &config.resolver);
    let orchestrator = ChatOrchestrator::new(&resolver, &store, &completion, &catalog);

    orchestrator.ensure_session("s1", "prompt").await.unwrap();
    // Last turn is the system seed, not an assistant reply.
    assert!(orchestrator.dispatch("s1", "/retry", "retry", "").await.is_err());

    // The failed retry recorded nothing.
    assert_eq!(store.load("s1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_command_errors() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let pool = setup_db(&config).await;

    let embedder = FakeEmbedder::new();
    let index = IndexClient::new(pool.clone());
    let store = SessionStore::new(pool.clone());
    let completion = CompletionClient::new(&config.chat).unwrap();
    let catalog = CommandCatalog::new(config.commands.clone());
    let resolver = Resolver::new(&embedder, &index, &config.resolver);
    let orchestrator = ChatOrchestrator::new(&resolver, &store, &completion, &catalog);

    assert!(orchestrator.dispatch("s1", "/frobnicate", "frobnicate", "").await.is_err());
}
