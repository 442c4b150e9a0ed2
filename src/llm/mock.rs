//! Mock LLM 客户端（用于测试与无 API Key 时的本地运行）
//!
//! 按顺序返回预置的回复；队列耗尽后返回默认回复。流式模式下把回复切成固定长度的片段。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{ChunkStream, LlmCapabilities, LlmClient, LlmError, LlmRequest, LlmResponse, StreamChunk};

/// 流式输出时每段字符数
const CHUNK_CHARS: usize = 8;

/// 预置回复的 Mock 客户端
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: String,
    streaming: bool,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按顺序返回这些回复
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::new();
        for r in replies {
            client.push_reply(r);
        }
        client
    }

    /// 声明流式能力
    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    /// 队列耗尽后返回的内容
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Ok(reply.into()));
        }
    }

    pub fn push_error(&self, err: LlmError) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Err(err));
        }
    }

    /// 已收到的请求（按调用顺序）
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn next_reply(&self, request: &LlmRequest) -> Result<String, LlmError> {
        if let Ok(mut r) = self.requests.lock() {
            r.push(request.clone());
        }
        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(reply) => reply,
            None => Ok(self.fallback.clone()),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn capabilities(&self) -> LlmCapabilities {
        LlmCapabilities {
            streaming: self.streaming,
        }
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.next_reply(request).map(LlmResponse::text)
    }

    async fn complete_stream(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError> {
        let content = self.next_reply(request)?;
        let chars: Vec<char> = content.chars().collect();
        let mut chunks: Vec<Result<StreamChunk, LlmError>> = chars
            .chunks(CHUNK_CHARS)
            .map(|c| {
                Ok(StreamChunk {
                    delta: c.iter().collect(),
                    is_complete: false,
                })
            })
            .collect();
        chunks.push(Ok(StreamChunk {
            delta: String::new(),
            is_complete: true,
        }));
        Ok(Box::pin(stream::iter(chunks)))
    }
}
