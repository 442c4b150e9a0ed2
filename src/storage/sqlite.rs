//! SQLite 存储
//!
//! 一张表，每个会话一行（session_id -> JSON 文本）。

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::core::state::now_millis;
use crate::core::AgentState;
use crate::storage::{StateStorage, StorageError};

/// SQLite 持久化：按会话 ID 存储整个 AgentState
pub struct SqliteStorage {
    conn: Mutex<Connection>,
    session_id: String,
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>, session_id: impl Into<String>) -> Result<Self, StorageError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::from_connection(Connection::open(path)?, session_id)
    }

    pub fn in_memory(session_id: impl Into<String>) -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?, session_id)
    }

    fn from_connection(conn: Connection, session_id: impl Into<String>) -> Result<Self, StorageError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS agent_state (
                session_id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            session_id: session_id.into(),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Backend("sqlite connection lock poisoned".to_string()))
    }
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl StateStorage for SqliteStorage {
    fn load(&self) -> Result<Option<AgentState>, StorageError> {
        let data: Option<String> = self
            .conn()?
            .query_row(
                "SELECT data FROM agent_state WHERE session_id = ?1",
                params![self.session_id],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save(&self, state: &AgentState) -> Result<(), StorageError> {
        let json = serde_json::to_string(state)?;
        self.conn()?.execute(
            "INSERT INTO agent_state (session_id, data, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(session_id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            params![self.session_id, json, now_millis()],
        )?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.conn()?.execute(
            "DELETE FROM agent_state WHERE session_id = ?1",
            params![self.session_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_and_load() {
        let storage = SqliteStorage::in_memory("s1").unwrap();
        assert!(storage.load().unwrap().is_none());
        let mut state = AgentState::new();
        storage.save(&state).unwrap();
        state.version = 9;
        storage.save(&state).unwrap();
        assert_eq!(storage.load().unwrap().unwrap().version, 9);
        storage.clear().unwrap();
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn test_sessions_isolated_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        let a = SqliteStorage::open(&path, "a").unwrap();
        let b = SqliteStorage::open(&path, "b").unwrap();
        a.save(&AgentState::new()).unwrap();
        assert!(a.load().unwrap().is_some());
        assert!(b.load().unwrap().is_none());
    }
}
