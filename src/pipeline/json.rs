//! 从 LLM 回复中提取 JSON
//!
//! 模型常把 JSON 包在 ```json 代码块里，或在前后夹带说明文字；这里只取第一段 JSON 对象。

use serde::de::DeserializeOwned;

use crate::core::AgentError;

/// 取出回复里的 JSON 文本：优先 ```json 代码块，其次第一个 `{` 到最后一个 `}`
pub fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 提取并反序列化；找不到 JSON 或结构不符都返回 JsonParseError
pub fn parse_json<T: DeserializeOwned>(output: &str) -> Result<T, AgentError> {
    let json_str = extract_json(output)
        .ok_or_else(|| AgentError::JsonParseError(format!("no JSON object in response: {}", preview(output))))?;
    serde_json::from_str(json_str).map_err(|e| AgentError::JsonParseError(format!("{}: {}", e, preview(json_str))))
}

fn preview(s: &str) -> String {
    const MAX: usize = 200;
    let s = s.trim();
    if s.chars().count() <= MAX {
        s.to_string()
    } else {
        let head: String = s.chars().take(MAX).collect();
        format!("{}...", head)
    }
}
