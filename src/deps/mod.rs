//! 依赖分析层：导入说明符提取、路径解析与双向依赖图

pub mod graph;
pub mod resolver;

pub use graph::{format_for_prompt, DependencyGraph};
pub use resolver::{is_bare_specifier, DependencyResolver, ResolverConfig};
