//! Generate 阶段：按顺序逐个执行 Action
//!
//! 维护一个工作视图（请求开始时的文件 + 已接受的变更），create / update 的存在性检查都基于它。
//! 单个 Action 的策略拒绝、文件已存在、文件不存在只记录为失败，循环继续；其余错误终止阶段。

use serde::Serialize;

use crate::core::{AgentError, AgentStage};
use crate::events::PipelineEvent;
use crate::llm::LlmRequest;
use crate::pipeline::{prompts, Action, ActionKind, PhaseContext, PipelineConfig, Plan, StageLlm};
use crate::policy::Policy;
use crate::vfs::{ChangeOp, FileChange, FileState, VirtualFile};

const OPEN_TAG: &str = "<file_content";
const CLOSE_TAG: &str = "</file_content>";

/// 执行结果：待落地的变更、变更涉及的路径、逐 Action 的失败描述
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub changes: Vec<FileChange>,
    pub changed_paths: Vec<String>,
    pub errors: Vec<String>,
}

/// 从 `<file_content ...>...</file_content>` 中取出文件内容；找不到标签返回 None
pub fn extract_file_content(response: &str) -> Option<String> {
    let start = response.find(OPEN_TAG)?;
    let after_open = &response[start + OPEN_TAG.len()..];
    let body_start = after_open.find('>')? + 1;
    let body = &after_open[body_start..];
    let end = body.find(CLOSE_TAG)?;
    let content = &body[..end];
    let content = content.strip_prefix("\r\n").or_else(|| content.strip_prefix('\n')).unwrap_or(content);
    let content = content.strip_suffix("\r\n").or_else(|| content.strip_suffix('\n')).unwrap_or(content);
    Some(content.to_string())
}

pub async fn execute(
    llm: &StageLlm<'_>,
    policy: &dyn Policy,
    ctx: &PhaseContext,
    plan: &Plan,
    config: &PipelineConfig,
) -> Result<ExecutionResult, AgentError> {
    let mut working = ctx.files.clone();
    let mut result = ExecutionResult::default();

    for action in &plan.actions {
        llm.check_cancelled()?;
        llm.events().emit(PipelineEvent::ActionStart {
            id: action.id.clone(),
            kind: action.kind,
            path: action.path.clone(),
        });

        match run_action(llm, policy, ctx, &working, action, config).await {
            Ok(change) => {
                if let Some(change) = change {
                    apply_to_view(&mut working, &change);
                    if !result.changed_paths.contains(&change.path) {
                        result.changed_paths.push(change.path.clone());
                    }
                    result.changes.push(change);
                }
                tracing::debug!(id = %action.id, path = %action.path, "Action complete");
                llm.events().emit(PipelineEvent::ActionComplete {
                    id: action.id.clone(),
                    path: action.path.clone(),
                });
            }
            Err(err) if err.is_action_local() => {
                let reason = format!("{} {} failed: {}", action.kind.as_str(), action.path, err);
                tracing::warn!(id = %action.id, "{}", reason);
                llm.events().emit(PipelineEvent::ActionFailed {
                    id: action.id.clone(),
                    path: action.path.clone(),
                    reason: reason.clone(),
                });
                result.errors.push(reason);
            }
            Err(err) => return Err(err),
        }
    }

    tracing::info!(
        changes = result.changes.len(),
        failed = result.errors.len(),
        "Actions processed"
    );
    Ok(result)
}

/// 执行单个 Action；Read 不产生变更
async fn run_action(
    llm: &StageLlm<'_>,
    policy: &dyn Policy,
    ctx: &PhaseContext,
    working: &FileState,
    action: &Action,
    config: &PipelineConfig,
) -> Result<Option<FileChange>, AgentError> {
    let decision = policy.check_action(action);
    if !decision.allowed {
        return Err(AgentError::PolicyViolation(decision.reason_or_default().to_string()));
    }

    let change = match action.kind {
        ActionKind::Read => return Ok(None),
        ActionKind::Delete => FileChange::delete(action.path.clone()),
        ActionKind::Create => {
            if working.contains_key(&action.path) {
                return Err(AgentError::FileExists(action.path.clone()));
            }
            let content = generate(llm, ctx, working, action, None, config).await?;
            FileChange::create(action.path.clone(), content)
        }
        ActionKind::Update => {
            let existing = working
                .get(&action.path)
                .ok_or_else(|| AgentError::FileNotFound(action.path.clone()))?;
            let content = generate(llm, ctx, working, action, Some(existing), config).await?;
            FileChange::update(action.path.clone(), content)
        }
    };

    let decision = policy.check_changes(std::slice::from_ref(&change));
    if !decision.allowed {
        return Err(AgentError::PolicyViolation(decision.reason_or_default().to_string()));
    }
    Ok(Some(change))
}

async fn generate(
    llm: &StageLlm<'_>,
    ctx: &PhaseContext,
    working: &FileState,
    action: &Action,
    existing: Option<&VirtualFile>,
    config: &PipelineConfig,
) -> Result<String, AgentError> {
    // 只取工作视图中存在的相关文件
    let related: Vec<&VirtualFile> = action
        .related_files
        .iter()
        .filter(|p| **p != action.path)
        .filter_map(|p| working.get(p))
        .collect();

    let prompt = prompts::generate_prompt(ctx, action, existing, &related, config);
    let request = LlmRequest::user(prompt).with_system(prompts::GENERATE_SYSTEM);
    let response = llm.call(AgentStage::Executing, request).await?;

    match extract_file_content(&response) {
        Some(content) => Ok(content),
        None => {
            tracing::error!(path = %action.path, "No <file_content> tag in response, using raw output");
            Ok(response)
        }
    }
}

fn apply_to_view(working: &mut FileState, change: &FileChange) {
    match change.op {
        ChangeOp::Delete => {
            working.remove(&change.path);
        }
        ChangeOp::Create | ChangeOp::Update => {
            let version = working.get(&change.path).map(|f| f.version + 1).unwrap_or(1);
            working.insert(
                change.path.clone(),
                VirtualFile {
                    path: change.path.clone(),
                    content: change.content.clone().unwrap_or_default(),
                    language: change.language.clone(),
                    version,
                    last_modified: crate::core::state::now_millis(),
                    metadata: None,
                },
            );
        }
    }
}
