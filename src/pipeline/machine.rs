//! 流水线状态机
//!
//! idle → intent → planning → executing → validating → completed；任一阶段出错直接进入 error，
//! 返回失败响应，不自动重试。阶段之间检查取消令牌，LLM 调用过程中也可被取消。

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, AgentStage, PhaseResult, StateManager};
use crate::deps::DependencyResolver;
use crate::events::{EventBus, PipelineEvent};
use crate::llm::LlmClient;
use crate::memory::Role;
use crate::pipeline::{
    executor, intent, planner, validator, AgentResponse, PhaseContext, PipelineConfig, StageLlm,
};
use crate::policy::{Policy, SafetyPolicy};

/// 单会话流水线：独占 StateManager，一次只处理一个请求
pub struct Pipeline {
    state: StateManager,
    llm: Arc<dyn LlmClient>,
    policy: Arc<dyn Policy>,
    resolver: DependencyResolver,
    events: Arc<EventBus>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(mut state: StateManager, llm: Arc<dyn LlmClient>) -> Self {
        let events = Arc::new(EventBus::new());
        state.set_events(events.clone());
        Self {
            state,
            llm,
            policy: Arc::new(SafetyPolicy::default()),
            resolver: DependencyResolver::default(),
            events,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn Policy>) -> Self {
        self.policy = policy;
        self
    }

    /// 共享外部的事件总线（StateManager 的文件/消息事件也发到这里）
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.state.set_events(events.clone());
        self.events = events;
        self
    }

    pub fn with_resolver(mut self, resolver: DependencyResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut StateManager {
        &mut self.state
    }

    pub fn into_state(self) -> StateManager {
        self.state
    }

    /// 处理一个请求；任何错误都转成失败响应
    pub async fn process(&mut self, request: &str, cancel: &CancellationToken) -> AgentResponse {
        match self.run(request, cancel).await {
            Ok(response) => response,
            Err(err) => self.fail(err),
        }
    }

    fn stage_llm<'a>(&'a self, cancel: &'a CancellationToken) -> StageLlm<'a> {
        StageLlm::new(self.llm.as_ref(), &self.events, cancel).with_timeouts(
            std::time::Duration::from_secs(self.config.request_timeout_secs),
            std::time::Duration::from_secs(self.config.stream_timeout_secs),
        )
    }

    async fn run(&mut self, request: &str, cancel: &CancellationToken) -> Result<AgentResponse, AgentError> {
        self.state.initialize(None)?;
        self.recover_interrupted()?;
        self.enter(AgentStage::Intent, cancel)?;

        let files = self.state.files().clone();
        let graph = self.resolver.build_graph(&files);
        let mut ctx = PhaseContext::new(request, files, self.state.messages().to_vec(), graph);
        self.state.append_message(Role::User, request)?;

        let classification = intent::classify(&self.stage_llm(cancel), &ctx, &self.config).await?;
        self.complete_phase(AgentStage::Intent, &classification)?;
        ctx.classification = Some(classification.clone());

        self.enter(AgentStage::Planning, cancel)?;
        let plan = planner::plan(&self.stage_llm(cancel), &ctx, &classification, &self.config).await?;
        let decision = self.policy.check_plan(&plan);
        if !decision.allowed {
            return Err(AgentError::PolicyViolation(decision.reason_or_default().to_string()));
        }
        self.complete_phase(AgentStage::Planning, &plan)?;
        ctx.plan = Some(plan.clone());

        self.enter(AgentStage::Executing, cancel)?;
        let execution =
            executor::execute(&self.stage_llm(cancel), self.policy.as_ref(), &ctx, &plan, &self.config).await?;
        if !execution.changes.is_empty() {
            let changes = execution.changes.clone();
            self.state.run_transaction(|tx| tx.mutate_files(&changes))?;
        }
        self.complete_phase(AgentStage::Executing, &execution)?;
        ctx.execution = Some(execution.clone());

        self.enter(AgentStage::Validating, cancel)?;
        let validation = validator::validate(&self.stage_llm(cancel), &ctx, &classification, &execution).await?;
        self.complete_phase(AgentStage::Validating, &validation)?;

        self.enter(AgentStage::Completed, cancel)?;
        let content = validation.render(execution.errors.len());
        self.state.append_message(Role::Assistant, content.clone())?;

        Ok(AgentResponse {
            success: true,
            content,
            changed_files: execution.changed_paths,
            stage: AgentStage::Completed,
            validation: Some(validation),
        })
    }

    /// 停在工作阶段的状态来自中断的运行（崩溃后加载，或回滚到事务快照）；记一条失败并转入 Error
    fn recover_interrupted(&mut self) -> Result<(), AgentError> {
        let stage = self.state.stage();
        if !stage.is_phase() {
            return Ok(());
        }
        tracing::warn!(stage = stage.as_str(), "Recovering from interrupted run");
        self.state
            .record_phase_result(PhaseResult::failure(stage, "Interrupted before completion"))?;
        self.state.set_stage(AgentStage::Error)
    }

    /// 进入下一阶段：先检查取消与迁移合法性，再记录阶段并发 StageStart
    fn enter(&mut self, stage: AgentStage, cancel: &CancellationToken) -> Result<(), AgentError> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        let from = self.state.stage();
        if !from.can_transition_to(stage) {
            return Err(AgentError::InvalidTransition { from, to: stage });
        }
        self.state.set_stage(stage)?;
        tracing::info!("Stage {} -> {}", from.as_str(), stage.as_str());
        if stage.is_phase() {
            self.events.emit(PipelineEvent::StageStart { stage });
        }
        Ok(())
    }

    fn complete_phase<T: Serialize>(&mut self, stage: AgentStage, output: &T) -> Result<(), AgentError> {
        let payload = serde_json::to_value(output).map_err(|e| AgentError::JsonParseError(e.to_string()))?;
        self.state.record_phase_result(PhaseResult::success(stage, payload))?;
        self.events.emit(PipelineEvent::StageComplete { stage });
        Ok(())
    }

    fn fail(&mut self, err: AgentError) -> AgentResponse {
        let stage = self.state.stage();
        let message = err.to_string();
        tracing::error!(stage = stage.as_str(), "Pipeline failed: {}", message);

        if stage.is_phase() {
            if let Err(e) = self.state.record_phase_result(PhaseResult::failure(stage, message.clone())) {
                tracing::error!("Failed to persist phase failure: {}", e);
            }
        }
        if let Err(e) = self.state.set_stage(AgentStage::Error) {
            tracing::error!("Failed to persist error stage: {}", e);
        }
        self.events.emit(PipelineEvent::Error {
            message: message.clone(),
        });
        AgentResponse::failure(format!("Request failed: {}", message))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("state", &self.state)
            .field("config", &self.config)
            .finish()
    }
}
