//! Session store integration tests: durable append, ordered load, and
//! last-turn edit/delete.

mod common;

use tempfile::TempDir;

use common::{test_config, setup_db};
use parley::error::SessionError;
use parley::models::{QueryHit, Resolution, Role, Turn};
use parley::session::SessionStore;

fn context_resolution() -> Resolution {
    Resolution::Context {
        items: vec![QueryHit {
            chunk_id: "c1".to_string(),
            score: 0.8,
            source_ref: "notes.md:1-10".to_string(),
            text: "retrieved text".to_string(),
            modified_at: 42,
        }],
        budget_used: 14,
    }
}

#[tokio::test]
async fn test_append_and_load_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let pool = setup_db(&config).await;
    let store = SessionStore::new(pool.clone());

    store.append("s1", &Turn::system("be brief".to_string())).await.unwrap();
    store
        .append("s1", &Turn::user("what is sync?".to_string(), context_resolution()))
        .await
        .unwrap();
    store.append("s1", &Turn::assistant("sync walks roots".to_string())).await.unwrap();

    let turns = store.load("s1").await.unwrap();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[0].role, Role::System);
    assert_eq!(turns[1].role, Role::User);
    assert_eq!(turns[2].role, Role::Assistant);

    match turns[1].resolution.as_ref().unwrap() {
        Resolution::Context { items, budget_used } => {
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].chunk_id, "c1");
            assert_eq!(*budget_used, 14);
        }
        other => panic!("expected context resolution, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_session_loads_empty() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let pool = setup_db(&config).await;
    let store = SessionStore::new(pool.clone());

    let turns = store.load("never-seen").await.unwrap();
    assert!(turns.is_empty());
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let pool = setup_db(&config).await;
    let store = SessionStore::new(pool.clone());

    store.append("s1", &Turn::assistant("for s1".to_string())).await.unwrap();
    store.append("s2", &Turn::assistant("for s2".to_string())).await.unwrap();

    let s1 = store.load("s1").await.unwrap();
    assert_eq!(s1.len(), 1);
    assert_eq!(s1[0].text, "for s1");
}

#[tokio::test]
async fn test_edit_last_replaces_only_the_last_turn() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let pool = setup_db(&config).await;
    let store = SessionStore::new(pool.clone());

    store.append("s1", &Turn::assistant("first".to_string())).await.unwrap();
    store.append("s1", &Turn::assistant("second".to_string())).await.unwrap();

    store.edit_last("s1", "second, revised").await.unwrap();

    let turns = store.load("s1").await.unwrap();
    assert_eq!(turns[0].text, "first");
    assert_eq!(turns[1].text, "second, revised");
}

#[tokio::test]
async fn test_edit_last_on_empty_session_errors() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let pool = setup_db(&config).await;
    let store = SessionStore::new(pool.clone());

    let err = store.edit_last("empty", "text").await.unwrap_err();
    assert!(matches!(err, SessionError::Empty(_)));
}

#[tokio::test]
async fn test_delete_last_removes_and_returns_the_turn() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let pool = setup_db(&config).await;
    let store = SessionStore::new(pool.clone());

    store.append("s1", &Turn::user("question".to_string(), context_resolution())).await.unwrap();
    store.append("s1", &Turn::assistant("bad answer".to_string())).await.unwrap();

    let deleted = store.delete_last("s1").await.unwrap();
    assert_eq!(deleted.role, Role::Assistant);
    assert_eq!(deleted.text, "bad answer");

    let turns = store.load("s1").await.unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].role, Role::User);

    // Appends after a delete keep extending the log.
    store.append("s1", &Turn::assistant("better answer".to_string())).await.unwrap();
    let turns = store.load("s1").await.unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].text, "better answer");
}

#[tokio::test]
async fn test_delete_last_on_empty_session_errors() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let pool = setup_db(&config).await;
    let store = SessionStore::new(pool.clone());

    let err = store.delete_last("empty").await.unwrap_err();
    assert!(matches!(err, SessionError::Empty(_)));
}

#[tokio::test]
async fn test_list_reports_turn_counts() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let pool = setup_db(&config).await;
    let store = SessionStore::new(pool.clone());

    store.append("s1", &Turn::assistant("a".to_string())).await.unwrap();
    store.append("s1", &Turn::assistant("b".to_string())).await.unwrap();
    store.append("s2", &Turn::assistant("c".to_string())).await.unwrap();

    let sessions = store.list().await.unwrap();
    assert_eq!(sessions.len(), 2);
    let s1 = sessions.iter().find(|s| s.session_id == "s1").unwrap();
    assert_eq!(s1.turn_count, 2);
}
