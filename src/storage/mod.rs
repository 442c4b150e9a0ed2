//! 状态存储抽象层
//!
//! 定义统一的 load / save / clear / watch 接口，支持内存、JSON 文件与 SQLite 三种实现。
//! 存储只负责忠实序列化整个 AgentState，不做版本迁移。

pub mod json_file;
pub mod memory;
pub mod sqlite;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::config::{AppSection, StorageKind};
use crate::core::AgentState;

pub use json_file::JsonFileStorage;
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

/// 存储后端错误
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// 外部变更回调（如另一个持有者写入了新状态）；None 表示状态被清空
pub type WatchCallback = Arc<dyn Fn(Option<&AgentState>) + Send + Sync>;

/// watch 订阅句柄；调用 unsubscribe 后不再收到通知
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// 状态存储接口
pub trait StateStorage: Send + Sync {
    /// 读取已保存的状态；从未保存过时返回 None
    fn load(&self) -> Result<Option<AgentState>, StorageError>;

    fn save(&self, state: &AgentState) -> Result<(), StorageError>;

    fn clear(&self) -> Result<(), StorageError>;

    /// 订阅带外变更；不支持的后端返回 None
    fn watch(&self, _callback: WatchCallback) -> Option<Subscription> {
        None
    }
}

/// 按 [app] 配置打开存储后端；json / sqlite 未指定路径时放在 ./.quill 下
pub fn open_storage(app: &AppSection) -> Result<Box<dyn StateStorage>, StorageError> {
    match app.storage {
        StorageKind::Memory => Ok(Box::new(MemoryStorage::new())),
        StorageKind::Json => {
            let path = app
                .state_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(".quill").join(format!("{}.json", app.session_id)));
            tracing::info!("Using JSON state file {}", path.display());
            Ok(Box::new(JsonFileStorage::new(path)))
        }
        StorageKind::Sqlite => {
            let path = app.state_path.clone().unwrap_or_else(|| PathBuf::from(".quill").join("state.db"));
            tracing::info!("Using SQLite state {} (session {})", path.display(), app.session_id);
            Ok(Box::new(SqliteStorage::open(path, app.session_id.clone())?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_storage_variants() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = AppSection::default();
        assert!(open_storage(&app).unwrap().load().unwrap().is_none());

        app.storage = StorageKind::Json;
        app.state_path = Some(dir.path().join("nested").join("state.json"));
        let storage = open_storage(&app).unwrap();
        storage.save(&AgentState::new()).unwrap();
        assert!(dir.path().join("nested").join("state.json").exists());

        app.storage = StorageKind::Sqlite;
        app.state_path = Some(dir.path().join("db").join("state.db"));
        let storage = open_storage(&app).unwrap();
        storage.save(&AgentState::new()).unwrap();
        assert_eq!(storage.load().unwrap().map(|s| s.version), Some(1));
    }
}
