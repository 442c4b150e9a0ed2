//! 虚拟文件系统：path -> VirtualFile 的内存映射
//!
//! 只由 StateManager 持有与修改；单条写入/删除不会失败。

use crate::core::state::now_millis;
use crate::vfs::file::{ChangeOp, FileChange, FileState, VirtualFile};
use crate::vfs::language::LanguageMap;
use crate::vfs::pattern::FilePattern;

/// 内存文件存储
#[derive(Clone, Debug, Default)]
pub struct VirtualFileSystem {
    files: FileState,
    languages: LanguageMap,
}

impl VirtualFileSystem {
    pub fn new(languages: LanguageMap) -> Self {
        Self {
            files: FileState::new(),
            languages,
        }
    }

    /// 创建（版本 1）或更新（版本 +1）；未显式给出语言时沿用旧语言，旧版本也没有才按扩展名推断
    pub fn write(&mut self, path: &str, content: impl Into<String>, language: Option<&str>) -> VirtualFile {
        let now = now_millis();
        let previous = self.files.get(path);
        let version = previous.map(|f| f.version + 1).unwrap_or(1);
        let metadata = previous.and_then(|f| f.metadata.clone());
        let language = language
            .map(String::from)
            .or_else(|| previous.and_then(|f| f.language.clone()))
            .or_else(|| self.languages.infer(path));

        let file = VirtualFile {
            path: path.to_string(),
            content: content.into(),
            language,
            version,
            last_modified: now,
            metadata,
        };
        self.files.insert(path.to_string(), file.clone());
        file
    }

    /// 删除，返回是否存在；不留墓碑
    pub fn delete(&mut self, path: &str) -> bool {
        self.files.remove(path).is_some()
    }

    pub fn get(&self, path: &str) -> Option<&VirtualFile> {
        self.files.get(path)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// 设置文件元数据（文件不存在时返回 false）；不改变版本
    pub fn set_metadata(&mut self, path: &str, metadata: serde_json::Value) -> bool {
        match self.files.get_mut(path) {
            Some(file) => {
                file.metadata = Some(metadata);
                true
            }
            None => false,
        }
    }

    /// 按路径顺序返回所有匹配文件
    pub fn find_by_pattern(&self, pattern: &FilePattern) -> Vec<VirtualFile> {
        self.files
            .values()
            .filter(|f| pattern.matches(&f.path))
            .cloned()
            .collect()
    }

    /// 按顺序应用一批变更；删除在结果中以墓碑（空内容、版本 0）表示
    pub fn apply_batch(&mut self, changes: &[FileChange]) -> Vec<VirtualFile> {
        changes
            .iter()
            .map(|change| match change.op {
                ChangeOp::Create | ChangeOp::Update => self.write(
                    &change.path,
                    change.content.clone().unwrap_or_default(),
                    change.language.as_deref(),
                ),
                ChangeOp::Delete => {
                    self.delete(&change.path);
                    VirtualFile::tombstone(&change.path, now_millis())
                }
            })
            .collect()
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.files.keys()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn export_state(&self) -> FileState {
        self.files.clone()
    }

    /// 完全替换当前内容（不合并）
    pub fn restore_state(&mut self, files: FileState) {
        self.files = files;
    }

    pub fn files(&self) -> &FileState {
        &self.files
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vfs() -> VirtualFileSystem {
        VirtualFileSystem::new(LanguageMap::default())
    }

    #[test]
    fn test_version_counts_writes() {
        let mut fs = vfs();
        for i in 1..=5 {
            let f = fs.write("/a.ts", format!("v{}", i), None);
            assert_eq!(f.version, i);
        }
        assert_eq!(fs.get("/a.ts").unwrap().content, "v5");
    }

    #[test]
    fn test_delete_then_write_resets_version() {
        let mut fs = vfs();
        fs.write("/a.ts", "1", None);
        fs.write("/a.ts", "2", None);
        assert!(fs.delete("/a.ts"));
        assert!(!fs.delete("/a.ts"));
        assert_eq!(fs.write("/a.ts", "3", None).version, 1);
    }

    #[test]
    fn test_language_inferred_then_preserved() {
        let mut fs = vfs();
        assert_eq!(fs.write("/a.ts", "", None).language.as_deref(), Some("typescript"));
        fs.write("/b.txt", "", Some("plain"));
        assert_eq!(fs.write("/b.txt", "x", None).language.as_deref(), Some("plain"));
        assert_eq!(fs.write("/b.txt", "y", Some("other")).language.as_deref(), Some("other"));
    }

    #[test]
    fn test_metadata_survives_update() {
        let mut fs = vfs();
        fs.write("/a.ts", "1", None);
        assert!(fs.set_metadata("/a.ts", serde_json::json!({"pinned": true})));
        let f = fs.write("/a.ts", "2", None);
        assert_eq!(f.metadata, Some(serde_json::json!({"pinned": true})));
        assert_eq!(f.version, 2);
    }

    #[test]
    fn test_apply_batch_in_order_with_tombstone() {
        let mut fs = vfs();
        let results = fs.apply_batch(&[
            FileChange::create("/a.ts", "a"),
            FileChange::update("/a.ts", "b"),
            FileChange::create("/c.ts", "c"),
            FileChange::delete("/c.ts"),
        ]);
        assert_eq!(results.len(), 4);
        assert_eq!(results[1].version, 2);
        assert!(results[3].is_tombstone());
        assert_eq!(results[3].content, "");
        assert!(!fs.exists("/c.ts"));
        assert_eq!(fs.get("/a.ts").unwrap().content, "b");
    }

    #[test]
    fn test_find_by_pattern_sorted() {
        let mut fs = vfs();
        fs.write("/src/z.ts", "", None);
        fs.write("/src/a.ts", "", None);
        fs.write("/src/a.css", "", None);
        let found = fs.find_by_pattern(&FilePattern::parse("/src/*.ts").unwrap());
        let paths: Vec<_> = found.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["/src/a.ts", "/src/z.ts"]);
    }

    #[test]
    fn test_restore_replaces_everything() {
        let mut fs = vfs();
        fs.write("/a.ts", "a", None);
        let saved = fs.export_state();
        fs.write("/b.ts", "b", None);
        fs.restore_state(saved);
        assert!(fs.exists("/a.ts"));
        assert!(!fs.exists("/b.ts"));
    }
}
