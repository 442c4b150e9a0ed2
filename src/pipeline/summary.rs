//! 供 Prompt 使用的有界摘要：文件列表、对话、package.json

use crate::config::SummaryLimit;
use crate::memory::Message;
use crate::vfs::{FileState, VirtualFile};

/// 文件摘要：最近修改的在前（同一时间按路径排序），超出上限附省略计数
pub fn summarize_files(files: &FileState, limit: SummaryLimit) -> String {
    if files.is_empty() {
        return "No files yet.".to_string();
    }

    let mut ordered: Vec<&VirtualFile> = files.values().collect();
    ordered.sort_by(|a, b| b.last_modified.cmp(&a.last_modified).then_with(|| a.path.cmp(&b.path)));

    let shown = limit.apply(ordered.len());
    let mut out = String::new();
    for file in ordered.iter().take(shown) {
        out.push_str(&format!(
            "- {} ({}, {} chars, v{})\n",
            file.path,
            file.language.as_deref().unwrap_or("text"),
            file.content.chars().count(),
            file.version
        ));
    }
    let omitted = ordered.len() - shown;
    if omitted > 0 {
        out.push_str(&format!("... and {} more files\n", omitted));
    }
    out
}

/// 对话摘要：只保留最近 max_messages 条，每条截断到 max_chars 个字符
pub fn summarize_conversation(messages: &[Message], max_messages: usize, max_chars: usize) -> String {
    if messages.is_empty() || max_messages == 0 {
        return "No previous conversation.".to_string();
    }
    let start = messages.len().saturating_sub(max_messages);
    let mut out = String::new();
    for m in &messages[start..] {
        out.push_str(&format!("{}: {}\n", m.role.as_str(), truncate_chars(&m.content, max_chars)));
    }
    out
}

/// package.json 摘要：名称、版本、依赖与脚本
pub fn summarize_manifest(files: &FileState) -> String {
    let manifest = files
        .values()
        .filter(|f| f.path == "package.json" || f.path.ends_with("/package.json"))
        .min_by_key(|f| (f.path.len(), f.path.clone()));

    let Some(manifest) = manifest else {
        return "No package.json found.".to_string();
    };

    let value: serde_json::Value = match serde_json::from_str(&manifest.content) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(path = %manifest.path, "package.json is not valid JSON: {}", e);
            return format!("{} present but could not be parsed.", manifest.path);
        }
    };

    let mut out = format!("{}\n", manifest.path);
    if let Some(name) = value.get("name").and_then(|v| v.as_str()) {
        out.push_str(&format!("  name: {}\n", name));
    }
    if let Some(version) = value.get("version").and_then(|v| v.as_str()) {
        out.push_str(&format!("  version: {}\n", version));
    }
    for key in ["dependencies", "devDependencies", "scripts"] {
        let Some(map) = value.get(key).and_then(|v| v.as_object()) else {
            continue;
        };
        if map.is_empty() {
            continue;
        }
        let names: Vec<&str> = map.keys().map(String::as_str).collect();
        out.push_str(&format!("  {}: {}\n", key, names.join(", ")));
    }
    out
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::{LanguageMap, VirtualFileSystem};

    fn file(path: &str, content: &str, last_modified: i64) -> VirtualFile {
        VirtualFile {
            path: path.into(),
            content: content.into(),
            language: None,
            version: 1,
            last_modified,
            metadata: None,
        }
    }

    #[test]
    fn test_files_most_recent_first_with_cap() {
        let mut files = FileState::new();
        files.insert("/old.ts".into(), file("/old.ts", "a", 1));
        files.insert("/new.ts".into(), file("/new.ts", "b", 3));
        files.insert("/mid.ts".into(), file("/mid.ts", "c", 2));

        let out = summarize_files(&files, SummaryLimit::Max(2));
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].starts_with("- /new.ts"));
        assert!(lines[1].starts_with("- /mid.ts"));
        assert_eq!(lines[2], "... and 1 more files");

        let all = summarize_files(&files, SummaryLimit::All);
        assert_eq!(all.lines().count(), 3);
        assert!(!all.contains("more files"));
    }

    #[test]
    fn test_empty_files() {
        assert_eq!(summarize_files(&FileState::new(), SummaryLimit::All), "No files yet.");
    }

    #[test]
    fn test_conversation_window_and_truncation() {
        let messages = vec![
            Message::user("first"),
            Message::assistant("second"),
            Message::user("a very long third message"),
        ];
        let out = summarize_conversation(&messages, 2, 6);
        assert!(!out.contains("first"));
        assert!(out.contains("assistant: second"));
        assert!(out.contains("user: a very..."));
        assert_eq!(summarize_conversation(&[], 5, 10), "No previous conversation.");
    }

    #[test]
    fn test_manifest_summary() {
        let mut fs = VirtualFileSystem::new(LanguageMap::default());
        fs.write(
            "/package.json",
            r#"{"name":"demo","version":"1.0.0","dependencies":{"react":"^18"},"scripts":{"build":"vite build"}}"#,
            None,
        );
        let out = summarize_manifest(fs.files());
        assert!(out.contains("name: demo"));
        assert!(out.contains("dependencies: react"));
        assert!(out.contains("scripts: build"));

        fs.write("/package.json", "{ not json", None);
        assert!(summarize_manifest(fs.files()).contains("could not be parsed"));
        assert_eq!(summarize_manifest(&FileState::new()), "No package.json found.");
    }
}
