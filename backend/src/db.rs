//! SQLite-backed session and record stores.
//!
//! Rows hold JSON next to the few columns needed for filtering. The `version` column carries
//! the compare-and-swap: an update only lands when the row still holds the version the writer
//! read.

use crate::errors::{db_error, PrivacyError, Result};
use crate::orchestrator::RecordPrivacyState;
use crate::session::AccessSession;
use crate::store::{RecordStore, SessionStore};
use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use uuid::Uuid;

pub type Db = Pool<Sqlite>;

pub async fn connect(db_url: &str, max_connections: u32) -> Result<Db> {
    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(db_url)
        .await
        .map_err(db_error)
}

pub async fn init_schema(db: &Db) -> Result<()> {
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS access_sessions (
  id TEXT PRIMARY KEY,
  record_id TEXT NOT NULL,
  status TEXT NOT NULL,
  expires_at TEXT NOT NULL,
  version INTEGER NOT NULL,
  session_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS access_sessions_record ON access_sessions (record_id);
CREATE INDEX IF NOT EXISTS access_sessions_status ON access_sessions (status);

CREATE TABLE IF NOT EXISTS records (
  id TEXT PRIMARY KEY,
  version INTEGER NOT NULL,
  state_json TEXT NOT NULL
);
"#,
    )
    .execute(db)
    .await
    .map_err(db_error)?;

    Ok(())
}

#[derive(Clone)]
pub struct SqliteSessionStore {
    db: Db,
}

impl SqliteSessionStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| {
        tracing::error!(error = %e, "failed to encode row");
        PrivacyError::Internal
    })
}

fn from_json<T: serde::de::DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| {
        tracing::error!(error = %e, "failed to decode stored row");
        PrivacyError::Internal
    })
}

fn rows_to_sessions(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<AccessSession>> {
    rows.iter()
        .map(|row| {
            let json: String = row.get(0);
            from_json(&json)
        })
        .collect()
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn get(&self, id: Uuid) -> Result<Option<AccessSession>> {
        let row = sqlx::query(r#"SELECT session_json FROM access_sessions WHERE id = ?"#)
            .bind(id.to_string())
            .fetch_optional(&self.db)
            .await
            .map_err(db_error)?;

        let Some(row) = row else { return Ok(None); };
        let json: String = row.get(0);
        from_json(&json).map(Some)
    }

    async fn insert(&self, session: &AccessSession) -> Result<bool> {
        let result = sqlx::query(
            r#"INSERT OR IGNORE INTO access_sessions (id, record_id, status, expires_at, version, session_json)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(session.id.to_string())
        .bind(session.record_id.to_string())
        .bind(session.status.as_str())
        .bind(session.expires_at.to_rfc3339())
        .bind(session.version as i64)
        .bind(to_json(session)?)
        .execute(&self.db)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn compare_and_swap(&self, expected_version: u64, session: &AccessSession) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE access_sessions
               SET status = ?, expires_at = ?, version = ?, session_json = ?
               WHERE id = ? AND version = ?"#,
        )
        .bind(session.status.as_str())
        .bind(session.expires_at.to_rfc3339())
        .bind(session.version as i64)
        .bind(to_json(session)?)
        .bind(session.id.to_string())
        .bind(expected_version as i64)
        .execute(&self.db)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn remove_if_version(&self, id: Uuid, expected_version: u64) -> Result<bool> {
        let result = sqlx::query(r#"DELETE FROM access_sessions WHERE id = ? AND version = ?"#)
            .bind(id.to_string())
            .bind(expected_version as i64)
            .execute(&self.db)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_open(&self) -> Result<Vec<AccessSession>> {
        let rows = sqlx::query(
            r#"SELECT session_json FROM access_sessions WHERE status IN ('pending', 'active')"#,
        )
        .fetch_all(&self.db)
        .await
        .map_err(db_error)?;

        rows_to_sessions(rows)
    }

    async fn list_for_record(&self, record_id: Uuid) -> Result<Vec<AccessSession>> {
        let rows = sqlx::query(r#"SELECT session_json FROM access_sessions WHERE record_id = ?"#)
            .bind(record_id.to_string())
            .fetch_all(&self.db)
            .await
            .map_err(db_error)?;

        rows_to_sessions(rows)
    }
}

#[derive(Clone)]
pub struct SqliteRecordStore {
    db: Db,
}

impl SqliteRecordStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get(&self, record_id: Uuid) -> Result<Option<RecordPrivacyState>> {
        let row = sqlx::query(r#"SELECT state_json FROM records WHERE id = ?"#)
            .bind(record_id.to_string())
            .fetch_optional(&self.db)
            .await
            .map_err(db_error)?;

        let Some(row) = row else { return Ok(None); };
        let json: String = row.get(0);
        from_json(&json).map(Some)
    }

    async fn insert(&self, state: &RecordPrivacyState) -> Result<bool> {
        let result = sqlx::query(r#"INSERT OR IGNORE INTO records (id, version, state_json) VALUES (?, ?, ?)"#)
            .bind(state.record.record_id.to_string())
            .bind(state.version as i64)
            .bind(to_json(state)?)
            .execute(&self.db)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn compare_and_swap(&self, expected_version: u64, state: &RecordPrivacyState) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE records SET version = ?, state_json = ? WHERE id = ? AND version = ?"#,
        )
        .bind(state.version as i64)
        .bind(to_json(state)?)
        .bind(state.record.record_id.to_string())
        .bind(expected_version as i64)
        .execute(&self.db)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{exercise_record_store, exercise_store};

    // A single connection keeps every query on the same in-memory database.
    async fn memory_store() -> SqliteSessionStore {
        let db = connect("sqlite::memory:", 1).await.unwrap();
        init_schema(&db).await.unwrap();
        SqliteSessionStore::new(db)
    }

    #[tokio::test]
    async fn sqlite_store_behaves() {
        exercise_store(&memory_store().await).await;
    }

    #[tokio::test]
    async fn sqlite_record_store_behaves() {
        let db = connect("sqlite::memory:", 1).await.unwrap();
        init_schema(&db).await.unwrap();
        exercise_record_store(&SqliteRecordStore::new(db)).await;
    }

    #[tokio::test]
    async fn schema_init_is_idempotent() {
        let store = memory_store().await;
        init_schema(&store.db).await.unwrap();
    }
}
