//! Plan 阶段：把分类结果转成有序的 Action 列表
//!
//! 解析失败直接返回错误，终止流水线。

use serde::{Deserialize, Serialize};

use crate::core::{AgentError, AgentStage};
use crate::llm::LlmRequest;
use crate::pipeline::json::parse_json;
use crate::pipeline::{prompts, Classification, PhaseContext, PipelineConfig, StageLlm};

/// Action 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
    Read,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
            ActionKind::Read => "read",
        }
    }
}

/// 单个文件操作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// 模型未给出时按顺序补成 `action-N`
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub path: String,
    #[serde(default)]
    pub description: String,
    /// 生成内容时一并提供给模型的文件
    #[serde(default)]
    pub related_files: Vec<String>,
}

/// 执行计划
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub actions: Vec<Action>,
    #[serde(default)]
    pub estimated_changes: usize,
    #[serde(default)]
    pub requires_confirmation: bool,
    #[serde(default)]
    pub reasoning: String,
}

pub fn parse_plan(output: &str) -> Result<Plan, AgentError> {
    let mut plan: Plan = parse_json(output)?;
    for (i, action) in plan.actions.iter_mut().enumerate() {
        if action.id.trim().is_empty() {
            action.id = format!("action-{}", i + 1);
        }
        action.path = action.path.trim().to_string();
    }
    Ok(plan)
}

pub async fn plan(
    llm: &StageLlm<'_>,
    ctx: &PhaseContext,
    classification: &Classification,
    config: &PipelineConfig,
) -> Result<Plan, AgentError> {
    let request =
        LlmRequest::user(prompts::plan_prompt(ctx, classification, config)).with_system(prompts::PLAN_SYSTEM);
    let output = llm.call(AgentStage::Planning, request).await?;
    let plan = parse_plan(&output)?;
    tracing::info!(
        actions = plan.actions.len(),
        requires_confirmation = plan.requires_confirmation,
        "Plan parsed"
    );
    Ok(plan)
}
