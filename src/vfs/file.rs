//! 虚拟文件与变更记录

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 全部虚拟文件（path -> 文件）；BTreeMap 保证序列化与遍历顺序确定
pub type FileState = BTreeMap<String, VirtualFile>;

/// 只存在于内存中的文件
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualFile {
    pub path: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// 从 1 开始，每次写入 +1；0 仅用于批量结果中的删除标记
    pub version: u64,
    pub last_modified: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl VirtualFile {
    /// 删除标记：内容为空、版本为 0，只出现在 apply_batch 的返回值中
    pub fn tombstone(path: impl Into<String>, timestamp: i64) -> Self {
        Self {
            path: path.into(),
            content: String::new(),
            language: None,
            version: 0,
            last_modified: timestamp,
            metadata: None,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.version == 0
    }

    /// 文件扩展名（含点，小写），如 `.ts`
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.path)
    }
}

/// 取路径最后一段的扩展名（含点，小写）；无扩展名或隐藏文件名返回 None
pub fn extension_of(path: &str) -> Option<String> {
    let name = path.rsplit('/').next().unwrap_or(path);
    let idx = name.rfind('.')?;
    if idx == 0 {
        return None;
    }
    Some(name[idx..].to_lowercase())
}

/// 批量变更的操作类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Create,
    Update,
    Delete,
}

/// 单条文件变更
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub op: ChangeOp,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl FileChange {
    pub fn create(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            op: ChangeOp::Create,
            path: path.into(),
            content: Some(content.into()),
            language: None,
        }
    }

    pub fn update(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            op: ChangeOp::Update,
            path: path.into(),
            content: Some(content.into()),
            language: None,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            op: ChangeOp::Delete,
            path: path.into(),
            content: None,
            language: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("/src/App.TSX").as_deref(), Some(".tsx"));
        assert_eq!(extension_of("/a/b.test.ts").as_deref(), Some(".ts"));
        assert_eq!(extension_of("/Dockerfile"), None);
        assert_eq!(extension_of("/.env"), None);
    }

    #[test]
    fn test_change_serializes_op_lowercase() {
        let json = serde_json::to_value(FileChange::delete("/x.ts")).unwrap();
        assert_eq!(json["op"], "delete");
        assert!(json.get("content").is_none());
    }
}
