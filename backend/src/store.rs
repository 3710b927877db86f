//! Session and record persistence with per-key compare-and-swap.

use crate::errors::Result;
use crate::orchestrator::RecordPrivacyState;
use crate::session::AccessSession;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Keyed session storage.
///
/// Writers read a session, compute the next state, and write it back with
/// [`SessionStore::compare_and_swap`] against the version they read. A `false` return means
/// another writer got there first and the caller must re-read.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<AccessSession>>;

    /// Insert a new session. Returns `false` if the id is taken.
    async fn insert(&self, session: &AccessSession) -> Result<bool>;

    /// Replace the stored session iff its version is still `expected_version`.
    async fn compare_and_swap(&self, expected_version: u64, session: &AccessSession) -> Result<bool>;

    /// Delete the session iff its version is still `expected_version`.
    async fn remove_if_version(&self, id: Uuid, expected_version: u64) -> Result<bool>;

    /// Sessions that are not yet terminal.
    async fn list_open(&self) -> Result<Vec<AccessSession>>;

    async fn list_for_record(&self, record_id: Uuid) -> Result<Vec<AccessSession>>;
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<Uuid, AccessSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, id: Uuid) -> Result<Option<AccessSession>> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn insert(&self, session: &AccessSession) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Ok(false);
        }
        sessions.insert(session.id, session.clone());
        Ok(true)
    }

    async fn compare_and_swap(&self, expected_version: u64, session: &AccessSession) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session.id) {
            Some(current) if current.version == expected_version => {
                *current = session.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove_if_version(&self, id: Uuid, expected_version: u64) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(&id) {
            Some(current) if current.version == expected_version => {
                sessions.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_open(&self) -> Result<Vec<AccessSession>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.values().filter(|s| !s.status.is_terminal()).cloned().collect())
    }

    async fn list_for_record(&self, record_id: Uuid) -> Result<Vec<AccessSession>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.values().filter(|s| s.record_id == record_id).cloned().collect())
    }
}

/// Keyed storage for registered records' public state.
///
/// Same contract as [`SessionStore`]: writers bump `version` and write back against the version
/// they read.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, record_id: Uuid) -> Result<Option<RecordPrivacyState>>;

    /// Register a record. Returns `false` if the id is taken.
    async fn insert(&self, state: &RecordPrivacyState) -> Result<bool>;

    async fn compare_and_swap(&self, expected_version: u64, state: &RecordPrivacyState) -> Result<bool>;
}

#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<Uuid, RecordPrivacyState>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, record_id: Uuid) -> Result<Option<RecordPrivacyState>> {
        Ok(self.records.read().await.get(&record_id).cloned())
    }

    async fn insert(&self, state: &RecordPrivacyState) -> Result<bool> {
        let mut records = self.records.write().await;
        let record_id = state.record.record_id;
        if records.contains_key(&record_id) {
            return Ok(false);
        }
        records.insert(record_id, state.clone());
        Ok(true)
    }

    async fn compare_and_swap(&self, expected_version: u64, state: &RecordPrivacyState) -> Result<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(&state.record.record_id) {
            Some(current) if current.version == expected_version => {
                *current = state.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
