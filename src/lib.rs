//! Quill - 虚拟文件上的四阶段 LLM 流水线
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、状态模型与版本化状态管理器（快照、事务、回滚）
//! - **deps**: 导入说明符提取、路径解析与双向依赖图
//! - **events**: 生命周期事件与同步事件总线
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 对话消息
//! - **observability**: 日志初始化
//! - **pipeline**: classify → plan → generate → validate 状态机
//! - **policy**: 计划、Action 与文件变更的安全策略
//! - **storage**: 状态持久化（内存 / JSON 文件 / SQLite）
//! - **vfs**: 只存在于内存中的虚拟文件系统

pub mod config;
pub mod core;
pub mod deps;
pub mod events;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod pipeline;
pub mod policy;
pub mod storage;
pub mod vfs;

pub use crate::core::{AgentError, AgentStage, AgentState, StateConfig, StateManager};
pub use crate::pipeline::{AgentResponse, Pipeline, PipelineConfig};
