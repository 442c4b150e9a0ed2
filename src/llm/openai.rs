//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 DeepSeek、OpenAI、自建代理等。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures_util::StreamExt;

use crate::llm::{
    ChunkStream, LlmCapabilities, LlmClient, LlmError, LlmRequest, LlmResponse, StreamChunk, Usage,
};
use crate::memory::{Message, Role};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：持有 Client 与 model 名，complete 时转 Message 为 API 格式并取首条 content
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    streaming: bool,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            streaming: false,
            usage: TokenUsage::new(),
        }
    }

    /// 构造时声明走流式接口
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn to_openai_messages(messages: &[Message]) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        messages
            .iter()
            .map(|m| {
                let msg = match m.role {
                    Role::System => ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::System),
                    Role::User => ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::User),
                    Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::Assistant),
                };
                msg.map_err(|e| LlmError::Request(e.to_string()))
            })
            .collect()
    }

    fn build_request(
        &self,
        request: &LlmRequest,
    ) -> Result<async_openai::types::chat::CreateChatCompletionRequest, LlmError> {
        if let Some(tools) = &request.tools {
            tracing::debug!(count = tools.len(), "Tool definitions are not forwarded to the chat endpoint");
        }
        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(Self::to_openai_messages(&request.full_messages())?)
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn capabilities(&self) -> LlmCapabilities {
        LlmCapabilities {
            streaming: self.streaming,
        }
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let req = self.build_request(request)?;
        let response = self
            .client
            .chat()
            .create(req)
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        // 提取 token 使用统计
        let usage = response.usage.as_ref().map(|u| Usage {
            prompt_tokens: u.prompt_tokens as u64,
            completion_tokens: u.completion_tokens as u64,
            total_tokens: u.total_tokens as u64,
        });
        if let Some(u) = &usage {
            self.usage.add(u.prompt_tokens, u.completion_tokens);
        }

        let choice = response.choices.first().ok_or(LlmError::EmptyResponse)?;
        Ok(LlmResponse {
            content: choice.message.content.clone().unwrap_or_default(),
            finish_reason: choice.finish_reason.as_ref().map(|r| format!("{:?}", r).to_lowercase()),
            usage,
        })
    }

    async fn complete_stream(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError> {
        let req = self.build_request(request)?;
        let upstream = self
            .client
            .chat()
            .create_stream(req)
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let chunks = upstream.map(|item| match item {
            Ok(resp) => {
                let choice = resp.choices.first();
                Ok(StreamChunk {
                    delta: choice
                        .and_then(|c| c.delta.content.clone())
                        .unwrap_or_default(),
                    is_complete: choice.map(|c| c.finish_reason.is_some()).unwrap_or(false),
                })
            }
            Err(e) => Err(LlmError::Stream(e.to_string())),
        });
        Ok(Box::pin(chunks))
    }
}
