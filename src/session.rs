//! Durable session turn log.
//!
//! The store exclusively owns the `turns` table: an append-only sequence
//! per session id, with the sole exceptions of user-initiated edit and
//! delete of the last turn. Appends commit (WAL) before returning, and a
//! failed write is always surfaced — a turn the user believes was saved
//! must never be silently lost.
//!
//! Concurrent appends to one session from multiple processes are not
//! supported: single-writer assumption, by convention rather than locking.

use sqlx::{Row, SqlitePool};

use crate::error::SessionError;
use crate::models::{Resolution, Role, Turn};

#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one turn. The sequence number is allocated inside the same
    /// transaction as the insert, so appends never collide with
    /// themselves.
    pub async fn append(&self, session_id: &str, turn: &Turn) -> Result<(), SessionError> {
        let resolution_json = match &turn.resolution {
            Some(r) => Some(serde_json::to_string(r).map_err(|e| SessionError::CorruptRecord {
                session: session_id.to_string(),
                seq: -1,
                reason: e.to_string(),
            })?),
            None => None,
        };

        let mut tx = self.pool.begin().await?;

        let next_seq: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) + 1 FROM turns WHERE session_id = ?")
                .bind(session_id)
                .fetch_one(&mut *tx)
                .await?;

        sqlx::query(
            r#"
            INSERT INTO turns (session_id, seq, role, text, resolution_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session_id)
        .bind(next_seq)
        .bind(role_str(turn.role))
        .bind(&turn.text)
        .bind(resolution_json)
        .bind(turn.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Load a session's turns in order. An unknown session id yields an
    /// empty sequence, not an error.
    pub async fn load(&self, session_id: &str) -> Result<Vec<Turn>, SessionError> {
        let rows = sqlx::query(
            "SELECT seq, role, text, resolution_json, created_at FROM turns WHERE session_id = ? ORDER BY seq",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        let mut turns = Vec::with_capacity(rows.len());
        for row in rows {
            let seq: i64 = row.get("seq");
            let role: String = row.get("role");
            let resolution_json: Option<String> = row.get("resolution_json");

            let resolution = match resolution_json {
                Some(json) => Some(serde_json::from_str::<Resolution>(&json).map_err(|e| {
                    SessionError::CorruptRecord {
                        session: session_id.to_string(),
                        seq,
                        reason: e.to_string(),
                    }
                })?),
                None => None,
            };

            turns.push(Turn {
                role: parse_role(&role).ok_or_else(|| SessionError::CorruptRecord {
                    session: session_id.to_string(),
                    seq,
                    reason: format!("unknown role '{}'", role),
                })?,
                text: row.get("text"),
                resolution,
                created_at: row.get("created_at"),
            });
        }

        Ok(turns)
    }

    /// Replace the text of the last turn.
    pub async fn edit_last(&self, session_id: &str, new_text: &str) -> Result<(), SessionError> {
        let result = sqlx::query(
            r#"
            UPDATE turns SET text = ?
            WHERE session_id = ? AND seq = (SELECT MAX(seq) FROM turns WHERE session_id = ?)
            "#,
        )
        .bind(new_text)
        .bind(session_id)
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SessionError::Empty(session_id.to_string()));
        }
        Ok(())
    }

    /// Remove the last turn, returning it.
    pub async fn delete_last(&self, session_id: &str) -> Result<Turn, SessionError> {
        let mut turns = self.load(session_id).await?;
        let last = turns.pop().ok_or_else(|| SessionError::Empty(session_id.to_string()))?;

        sqlx::query(
            r#"
            DELETE FROM turns
            WHERE session_id = ? AND seq = (SELECT MAX(seq) FROM turns WHERE session_id = ?)
            "#,
        )
        .bind(session_id)
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        Ok(last)
    }

    /// All known sessions with their turn counts and last activity,
    /// newest first.
    pub async fn list(&self) -> Result<Vec<SessionInfo>, SessionError> {
        let rows = sqlx::query(
            r#"
            SELECT session_id, COUNT(*) AS turn_count, MAX(created_at) AS last_active
            FROM turns GROUP BY session_id ORDER BY last_active DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| SessionInfo {
                session_id: row.get("session_id"),
                turn_count: row.get("turn_count"),
                last_active: row.get("last_active"),
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: String,
    pub turn_count: i64,
    pub last_active: i64,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}

fn parse_role(s: &str) -> Option<Role> {
    match s {
        "user" => Some(Role::User),
        "assistant" => Some(Role::Assistant),
        "system" => Some(Role::System),
        _ => None,
    }
}
