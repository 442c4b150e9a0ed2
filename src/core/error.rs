//! 错误类型
//!
//! AgentError 是流水线与状态管理器对外暴露的统一错误；存储与 LLM 协作者各有自己的错误，经 `From` 汇入。

use thiserror::Error;

use crate::core::AgentStage;
use crate::llm::LlmError;
use crate::storage::StorageError;

/// 状态管理与流水线运行中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Network timeout")]
    NetworkTimeout,

    #[error("Cancelled")]
    Cancelled,

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("LLM error: {0}")]
    LlmError(#[from] LlmError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// 策略拒绝（计划级别会终止整条流水线）
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("File already exists: {0}")]
    FileExists(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid file pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid stage transition: {from:?} -> {to:?}")]
    InvalidTransition { from: AgentStage, to: AgentStage },
}

impl AgentError {
    /// 是否为单个 Action 级别可恢复的错误（记录失败后继续下一个 Action）
    pub fn is_action_local(&self) -> bool {
        matches!(
            self,
            AgentError::PolicyViolation(_) | AgentError::FileExists(_) | AgentError::FileNotFound(_)
        )
    }
}
