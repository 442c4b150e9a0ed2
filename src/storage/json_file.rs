//! JSON 文件存储
//!
//! 单文件保存整个 AgentState；先写临时文件再 rename，避免半写入的文件。

use std::path::{Path, PathBuf};

use crate::core::AgentState;
use crate::storage::{StateStorage, StorageError};

/// 单文件 JSON 持久化
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStorage for JsonFileStorage {
    /// 文件不存在时返回 None
    fn load(&self) -> Result<Option<AgentState>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    /// 父目录不存在时自动创建
    fn save(&self, state: &AgentState) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(state)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Message;
    use crate::vfs::{LanguageMap, VirtualFileSystem};

    #[test]
    fn test_round_trip_state() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("nested/state.json"));
        assert!(storage.load().unwrap().is_none());

        let mut fs = VirtualFileSystem::new(LanguageMap::default());
        fs.write("/a.ts", "export const a = 1;", None);
        let mut state = AgentState::new();
        state.files = fs.export_state();
        state.messages.push(Message::user("hello"));
        state.version = 3;

        storage.save(&state).unwrap();
        assert_eq!(storage.load().unwrap(), Some(state));
    }

    #[test]
    fn test_clear_missing_file_ok() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("none.json"));
        storage.clear().unwrap();
        storage.save(&AgentState::new()).unwrap();
        storage.clear().unwrap();
        assert!(storage.load().unwrap().is_none());
    }
}
