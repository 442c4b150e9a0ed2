//! 流水线：classify → plan → generate → validate
//!
//! 每个请求依次经过四个阶段；阶段之间通过 PhaseContext 传递当前文件、对话与前序输出。
//! generate 阶段结束时，所有被接受的变更在一次事务内通过 StateManager 落地。

pub mod context;
pub mod executor;
pub mod intent;
pub mod invoke;
pub mod json;
pub mod machine;
pub mod planner;
pub mod prompts;
pub mod summary;
pub mod validator;

use serde::Serialize;

use crate::config::SummaryLimit;
use crate::core::AgentStage;

pub use context::PhaseContext;
pub use executor::{extract_file_content, ExecutionResult};
pub use intent::{Classification, IntentType};
pub use invoke::StageLlm;
pub use machine::Pipeline;
pub use planner::{Action, ActionKind, Plan};
pub use validator::{Validation, ValidationSummary};

/// 流水线配置（摘要上限与 LLM 超时）
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 文件摘要最多列出多少个文件（最近修改优先）
    pub max_files_in_summary: SummaryLimit,
    /// 依赖图摘要最多列出多少个文件
    pub max_graph_entries: SummaryLimit,
    /// 对话摘要保留最近多少条消息
    pub max_conversation_messages: usize,
    /// 对话摘要中单条消息的最大字符数
    pub max_message_chars: usize,
    pub request_timeout_secs: u64,
    pub stream_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_files_in_summary: SummaryLimit::Max(20),
            max_graph_entries: SummaryLimit::Max(30),
            max_conversation_messages: 10,
            max_message_chars: 200,
            request_timeout_secs: 60,
            stream_timeout_secs: 120,
        }
    }
}

/// 一次请求的最终结果；失败时 changed_files 为空、stage 为 Error
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub success: bool,
    pub content: String,
    pub changed_files: Vec<String>,
    pub stage: AgentStage,
    /// 校验阶段的结论；失败响应为 None
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
}

impl AgentResponse {
    pub fn failure(content: impl Into<String>) -> Self {
        Self {
            success: false,
            content: content.into(),
            changed_files: Vec::new(),
            stage: AgentStage::Error,
            validation: None,
        }
    }
}
