//! DeepSeek 后端（OpenAI 兼容端点）
//!
//! 模型：deepseek-chat（常规对话）、deepseek-reasoner（思考模式）。

use crate::config::LlmSection;
use crate::llm::OpenAiClient;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const DEEPSEEK_REASONER: &str = "deepseek-reasoner";

/// 按 [llm] 段创建 DeepSeek 客户端
///
/// Key 取 `DEEPSEEK_API_KEY`，没有时退回 `OPENAI_API_KEY`；`base_url` 未配置时使用官方端点；
/// 配置里的模型为空时读 `DEEPSEEK_MODEL`，再退回 deepseek-chat。
pub fn create_deepseek_client(section: &LlmSection) -> OpenAiClient {
    let api_key = std::env::var("DEEPSEEK_API_KEY")
        .or_else(|_| std::env::var("OPENAI_API_KEY"))
        .ok();
    let model = Some(section.model.trim())
        .filter(|m| !m.is_empty())
        .map(String::from)
        .or_else(|| std::env::var("DEEPSEEK_MODEL").ok())
        .unwrap_or_else(|| DEEPSEEK_CHAT.to_string());
    let base_url = section.base_url.as_deref().unwrap_or(DEEPSEEK_BASE_URL);

    OpenAiClient::new(Some(base_url), &model, api_key.as_deref()).with_streaming(section.streaming)
}
