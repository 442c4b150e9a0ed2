//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `QUILL__*` 覆盖（双下划线表示嵌套，如 `QUILL__LLM__PROVIDER=openai`）。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::core::StateConfig;
use crate::deps::ResolverConfig;
use crate::pipeline::PipelineConfig;
use crate::policy::PolicyConfig;
use crate::vfs::LanguageMap;

/// 摘要条数上限：具体数量，或 "all" 表示不限
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawLimit")]
pub enum SummaryLimit {
    All,
    Max(usize),
}

impl SummaryLimit {
    /// 在 total 条中实际展示多少条
    pub fn apply(self, total: usize) -> usize {
        match self {
            SummaryLimit::All => total,
            SummaryLimit::Max(n) => total.min(n),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLimit {
    Count(usize),
    Word(String),
}

impl TryFrom<RawLimit> for SummaryLimit {
    type Error = String;

    fn try_from(raw: RawLimit) -> Result<Self, Self::Error> {
        match raw {
            RawLimit::Count(n) => Ok(SummaryLimit::Max(n)),
            RawLimit::Word(w) if w.eq_ignore_ascii_case("all") => Ok(SummaryLimit::All),
            RawLimit::Word(w) => w
                .parse::<usize>()
                .map(SummaryLimit::Max)
                .map_err(|_| format!("expected a number or \"all\", got {:?}", w)),
        }
    }
}

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub resolver: ResolverSection,
    pub policy: PolicySection,
    pub pipeline: PipelineSection,
    /// 额外的扩展名 -> 语言映射，覆盖内置表；键不带点（如 `vue = "vue"`）
    pub languages: HashMap<String, String>,
}

/// 存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Memory,
    Json,
    Sqlite,
}

/// [app] 段：会话、存储与快照
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    pub session_id: String,
    pub storage: StorageKind,
    /// json / sqlite 后端的文件路径，未设置时用 ./.quill/state.{json,db}
    pub state_path: Option<PathBuf>,
    pub auto_save: bool,
    pub max_snapshots: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            session_id: "default".to_string(),
            storage: StorageKind::Memory,
            state_path: None,
            auto_save: true,
            max_snapshots: 10,
        }
    }
}

/// [llm] 段：后端选择、流式开关与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 是否优先使用流式接口（构造客户端时决定，运行中不再探测）
    pub streaming: bool,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
            base_url: None,
            streaming: false,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
    pub stream: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: 60,
            stream: 120,
        }
    }
}

/// [resolver] 段：导入解析的探测顺序
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverSection {
    pub extensions: Vec<String>,
    pub index_files: Vec<String>,
}

impl Default for ResolverSection {
    fn default() -> Self {
        let d = ResolverConfig::default();
        Self {
            extensions: d.extensions,
            index_files: d.index_files,
        }
    }
}

/// [policy] 段：文件大小、扩展名白名单、Action 数量、确认开关
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    pub max_file_size: usize,
    pub allowed_extensions: Vec<String>,
    pub max_actions: usize,
    pub require_confirmation: bool,
    pub blocked_path_prefixes: Vec<String>,
    pub blocked_path_fragments: Vec<String>,
}

impl Default for PolicySection {
    fn default() -> Self {
        let d = PolicyConfig::default();
        Self {
            max_file_size: d.max_file_size,
            allowed_extensions: d.allowed_extensions,
            max_actions: d.max_actions,
            require_confirmation: d.require_confirmation,
            blocked_path_prefixes: d.blocked_path_prefixes,
            blocked_path_fragments: d.blocked_path_fragments,
        }
    }
}

/// [pipeline] 段：Prompt 摘要的上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub max_files_in_summary: SummaryLimit,
    pub max_graph_entries: SummaryLimit,
    pub max_conversation_messages: usize,
    pub max_message_chars: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        let d = PipelineConfig::default();
        Self {
            max_files_in_summary: d.max_files_in_summary,
            max_graph_entries: d.max_graph_entries,
            max_conversation_messages: d.max_conversation_messages,
            max_message_chars: d.max_message_chars,
        }
    }
}

impl AppConfig {
    pub fn language_map(&self) -> LanguageMap {
        let mut map = LanguageMap::default();
        map.extend(&self.languages);
        map
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            extensions: self.resolver.extensions.clone(),
            index_files: self.resolver.index_files.clone(),
        }
    }

    pub fn policy_config(&self) -> PolicyConfig {
        PolicyConfig {
            max_file_size: self.policy.max_file_size,
            allowed_extensions: self.policy.allowed_extensions.clone(),
            max_actions: self.policy.max_actions,
            require_confirmation: self.policy.require_confirmation,
            blocked_path_prefixes: self.policy.blocked_path_prefixes.clone(),
            blocked_path_fragments: self.policy.blocked_path_fragments.clone(),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_files_in_summary: self.pipeline.max_files_in_summary,
            max_graph_entries: self.pipeline.max_graph_entries,
            max_conversation_messages: self.pipeline.max_conversation_messages,
            max_message_chars: self.pipeline.max_message_chars,
            request_timeout_secs: self.llm.timeouts.request,
            stream_timeout_secs: self.llm.timeouts.stream,
        }
    }

    pub fn state_config(&self) -> StateConfig {
        StateConfig {
            auto_save: self.app.auto_save,
            max_snapshots: self.app.max_snapshots,
            languages: self.language_map(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 QUILL__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 QUILL__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("QUILL")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_limit_from_toml() {
        #[derive(Deserialize)]
        struct Wrap {
            a: SummaryLimit,
            b: SummaryLimit,
            c: SummaryLimit,
        }
        let src = "a = 5\nb = \"all\"\nc = \"12\"\n";
        let w: Wrap = config::Config::builder()
            .add_source(config::File::from_str(src, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(w.a, SummaryLimit::Max(5));
        assert_eq!(w.b, SummaryLimit::All);
        assert_eq!(w.c, SummaryLimit::Max(12));
    }

    #[test]
    fn test_summary_limit_apply() {
        assert_eq!(SummaryLimit::All.apply(7), 7);
        assert_eq!(SummaryLimit::Max(3).apply(7), 3);
        assert_eq!(SummaryLimit::Max(10).apply(7), 7);
    }

    #[test]
    fn test_defaults_and_overrides() {
        let src = r#"
[app]
storage = "sqlite"
max_snapshots = 3

[policy]
max_actions = 4

[languages]
vue = "vue"
"#;
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(src, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(cfg.app.storage, StorageKind::Sqlite);
        assert_eq!(cfg.app.max_snapshots, 3);
        assert!(cfg.app.auto_save);
        assert_eq!(cfg.policy_config().max_actions, 4);
        assert_eq!(cfg.resolver_config(), ResolverConfig::default());
        assert_eq!(cfg.language_map().infer("/App.vue").as_deref(), Some("vue"));
        assert_eq!(cfg.state_config().max_snapshots, 3);
    }
}
