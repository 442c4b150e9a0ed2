//! 状态定义：AgentState 聚合根、阶段、阶段结果与快照
//!
//! AgentState 是持久化与快照的最小单位；一个会话只有一个 AgentState。

use serde::{Deserialize, Serialize};

use crate::memory::Message;
use crate::vfs::FileState;

/// 当前时间（毫秒时间戳）
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 会话阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStage {
    #[default]
    Idle,
    Intent,
    Planning,
    Executing,
    Validating,
    Completed,
    Error,
}

impl AgentStage {
    /// 合法的阶段迁移：error 可从任意阶段进入；completed 只能从 validating 进入；
    /// 新请求可从 idle / completed / error 重新开始
    pub fn can_transition_to(self, next: AgentStage) -> bool {
        use AgentStage::*;
        match (self, next) {
            (_, Error) | (_, Idle) => true,
            (Idle | Completed | Error, Intent) => true,
            (Intent, Planning) => true,
            (Planning, Executing) => true,
            (Executing, Validating) => true,
            (Validating, Completed) => true,
            _ => false,
        }
    }

    /// 是否为流水线的四个工作阶段之一
    pub fn is_phase(self) -> bool {
        matches!(
            self,
            AgentStage::Intent | AgentStage::Planning | AgentStage::Executing | AgentStage::Validating
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentStage::Idle => "idle",
            AgentStage::Intent => "intent",
            AgentStage::Planning => "planning",
            AgentStage::Executing => "executing",
            AgentStage::Validating => "validating",
            AgentStage::Completed => "completed",
            AgentStage::Error => "error",
        }
    }
}

/// 单个阶段的执行记录（只追加的审计轨迹）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseResult {
    pub phase: AgentStage,
    pub success: bool,
    pub timestamp: i64,
    /// 阶段的类型化输出（序列化后的 JSON）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PhaseResult {
    pub fn success(phase: AgentStage, payload: serde_json::Value) -> Self {
        Self {
            phase,
            success: true,
            timestamp: now_millis(),
            payload: Some(payload),
            error: None,
        }
    }

    pub fn failure(phase: AgentStage, error: impl Into<String>) -> Self {
        Self {
            phase,
            success: false,
            timestamp: now_millis(),
            payload: None,
            error: Some(error.into()),
        }
    }
}

/// 会话聚合根
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentState {
    pub files: FileState,
    pub messages: Vec<Message>,
    pub stage: AgentStage,
    pub history: Vec<PhaseResult>,
    pub version: u64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl AgentState {
    /// 空状态：版本从 1 开始
    pub fn new() -> Self {
        let now = now_millis();
        Self {
            files: FileState::new(),
            messages: Vec::new(),
            stage: AgentStage::Idle,
            history: Vec::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = now_millis();
    }
}

impl Default for AgentState {
    fn default() -> Self {
        Self::new()
    }
}

/// 不可变的状态快照（深拷贝）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u64,
    pub timestamp: i64,
    pub state: AgentState,
}
