//! 阶段上下文：请求开始时的文件与对话快照，加上逐阶段累积的输出

use crate::deps::DependencyGraph;
use crate::memory::Message;
use crate::pipeline::{Classification, ExecutionResult, Plan};
use crate::vfs::FileState;

/// 在四个阶段之间传递的上下文
#[derive(Debug, Clone, Default)]
pub struct PhaseContext {
    pub request: String,
    /// 请求开始时的文件集合（generate 阶段在自己的工作视图上叠加变更）
    pub files: FileState,
    pub messages: Vec<Message>,
    pub graph: DependencyGraph,
    pub classification: Option<Classification>,
    pub plan: Option<Plan>,
    pub execution: Option<ExecutionResult>,
}

impl PhaseContext {
    pub fn new(request: impl Into<String>, files: FileState, messages: Vec<Message>, graph: DependencyGraph) -> Self {
        Self {
            request: request.into(),
            files,
            messages,
            graph,
            ..Self::default()
        }
    }
}
