//! 阶段内的 LLM 调用：统一处理流式/非流式、超时、取消与 LLM 事件

use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, AgentStage};
use crate::events::{EventBus, PipelineEvent};
use crate::llm::{LlmClient, LlmRequest};

/// 某次请求内共享的 LLM 调用器；走流式还是非流式由客户端声明的能力决定
pub struct StageLlm<'a> {
    llm: &'a dyn LlmClient,
    events: &'a EventBus,
    cancel: &'a CancellationToken,
    request_timeout: Duration,
    stream_timeout: Duration,
}

impl<'a> StageLlm<'a> {
    pub fn new(llm: &'a dyn LlmClient, events: &'a EventBus, cancel: &'a CancellationToken) -> Self {
        Self {
            llm,
            events,
            cancel,
            request_timeout: Duration::from_secs(60),
            stream_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeouts(mut self, request: Duration, stream: Duration) -> Self {
        self.request_timeout = request;
        self.stream_timeout = stream;
        self
    }

    pub fn events(&self) -> &EventBus {
        self.events
    }

    /// 已取消时立即返回 Cancelled
    pub fn check_cancelled(&self) -> Result<(), AgentError> {
        if self.cancel.is_cancelled() {
            Err(AgentError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// 发起一次调用并返回完整文本；调用过程中可被取消
    pub async fn call(&self, stage: AgentStage, request: LlmRequest) -> Result<String, AgentError> {
        self.check_cancelled()?;
        let streaming = self.llm.capabilities().streaming;
        tracing::debug!(stage = stage.as_str(), streaming, "Calling LLM");

        tokio::select! {
            _ = self.cancel.cancelled() => {
                tracing::info!(stage = stage.as_str(), "LLM call cancelled");
                Err(AgentError::Cancelled)
            }
            result = async {
                if streaming {
                    self.stream(stage, &request).await
                } else {
                    self.complete(stage, &request).await
                }
            } => result,
        }
    }

    async fn complete(&self, stage: AgentStage, request: &LlmRequest) -> Result<String, AgentError> {
        self.events.emit(PipelineEvent::LlmStart { stage });
        let response = tokio::time::timeout(self.request_timeout, self.llm.complete(request))
            .await
            .map_err(|_| AgentError::NetworkTimeout)??;
        if let Some(usage) = &response.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "LLM usage"
            );
        }
        self.events.emit(PipelineEvent::LlmComplete {
            stage,
            chars: response.content.chars().count(),
        });
        Ok(response.content)
    }

    async fn stream(&self, stage: AgentStage, request: &LlmRequest) -> Result<String, AgentError> {
        self.events.emit(PipelineEvent::LlmStreamStart { stage });
        let collect = async {
            let mut stream = self.llm.complete_stream(request).await?;
            let mut content = String::new();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                if !chunk.delta.is_empty() {
                    content.push_str(&chunk.delta);
                    self.events.emit(PipelineEvent::LlmChunk {
                        stage,
                        delta: chunk.delta,
                    });
                }
                if chunk.is_complete {
                    break;
                }
            }
            Ok::<_, AgentError>(content)
        };
        let content = tokio::time::timeout(self.stream_timeout, collect)
            .await
            .map_err(|_| AgentError::NetworkTimeout)??;
        self.events.emit(PipelineEvent::LlmStreamComplete {
            stage,
            chars: content.chars().count(),
        });
        Ok(content)
    }
}
