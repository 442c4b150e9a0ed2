//! 核心层：错误类型、状态模型与版本化状态管理器

pub mod error;
pub mod state;
pub mod state_manager;

pub use error::AgentError;
pub use state::{AgentStage, AgentState, PhaseResult, Snapshot};
pub use state_manager::{SeedFile, StateConfig, StateManager};
