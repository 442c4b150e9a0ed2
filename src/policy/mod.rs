//! 安全策略：计划、单个 Action 与文件变更的准入检查
//!
//! 路径禁止包含 `..`、`//`、空字节、`<>:"|?*` 与控制字符，以及已知的系统路径片段；
//! 文件内容受大小上限约束，扩展名须在白名单内（白名单为空时不检查）。

use serde::Serialize;

use crate::pipeline::{Action, ActionKind, Plan};
use crate::vfs::{extension_of, ChangeOp, FileChange};

/// 策略判定结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }

    /// 拒绝原因（允许时为空串）
    pub fn reason_or_default(&self) -> &str {
        self.reason.as_deref().unwrap_or("")
    }
}

/// 策略协作者接口；流水线只依赖此 trait
pub trait Policy: Send + Sync {
    fn check_plan(&self, plan: &Plan) -> PolicyDecision;

    fn check_action(&self, action: &Action) -> PolicyDecision;

    fn check_changes(&self, changes: &[FileChange]) -> PolicyDecision;
}

/// 策略配置
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// 单个文件内容的最大字节数
    pub max_file_size: usize,
    /// 允许的扩展名（含点，小写）；为空表示不限制
    pub allowed_extensions: Vec<String>,
    pub max_actions: usize,
    /// 为 true 时，声明需要确认的计划会被拒绝（流水线内没有确认通道）
    pub require_confirmation: bool,
    /// 禁止的系统路径前缀（不区分大小写，只匹配路径开头）
    pub blocked_path_prefixes: Vec<String>,
    /// 路径任意位置都禁止出现的片段（不区分大小写）
    pub blocked_path_fragments: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_file_size: 512 * 1024,
            allowed_extensions: [
                ".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs", ".json", ".css", ".scss", ".html",
                ".md", ".txt", ".yaml", ".yml", ".svg",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            max_actions: 20,
            require_confirmation: false,
            blocked_path_prefixes: ["/etc/", "/proc/", "/sys/", "/dev/", "/usr/", "/bin/", "/sbin/", "c:\\"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            blocked_path_fragments: ["system32", "/.git/", "/node_modules/"]
                .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

const RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// 默认策略实现
#[derive(Debug, Clone, Default)]
pub struct SafetyPolicy {
    config: PolicyConfig,
}

impl SafetyPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// 路径安全检查
    pub fn check_path(&self, path: &str) -> PolicyDecision {
        if path.trim().is_empty() {
            return PolicyDecision::deny("empty path");
        }
        if path.contains("..") || path.contains("//") {
            return PolicyDecision::deny(format!("path traversal is not allowed: {}", path));
        }
        if path.contains('\0') {
            return PolicyDecision::deny(format!("null byte in path: {}", path.escape_debug()));
        }
        if path.chars().any(|c| RESERVED_CHARS.contains(&c) || c.is_control()) {
            return PolicyDecision::deny(format!("reserved character in path: {}", path.escape_debug()));
        }
        let lower = path.to_lowercase();
        if let Some(prefix) = self
            .config
            .blocked_path_prefixes
            .iter()
            .find(|p| lower.starts_with(&p.to_lowercase()))
        {
            return PolicyDecision::deny(format!("system path {} is not allowed: {}", prefix, path));
        }
        if let Some(fragment) = self
            .config
            .blocked_path_fragments
            .iter()
            .find(|f| lower.contains(&f.to_lowercase()))
        {
            return PolicyDecision::deny(format!("system path {} is not allowed: {}", fragment, path));
        }
        PolicyDecision::allow()
    }

    fn check_extension(&self, path: &str) -> PolicyDecision {
        if self.config.allowed_extensions.is_empty() {
            return PolicyDecision::allow();
        }
        match extension_of(path) {
            Some(ext)
                if self
                    .config
                    .allowed_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(&ext)) =>
            {
                PolicyDecision::allow()
            }
            Some(ext) => PolicyDecision::deny(format!("file extension {} is not allowed: {}", ext, path)),
            None => PolicyDecision::deny(format!("file without extension is not allowed: {}", path)),
        }
    }
}

impl Policy for SafetyPolicy {
    fn check_plan(&self, plan: &Plan) -> PolicyDecision {
        if plan.actions.len() > self.config.max_actions {
            return PolicyDecision::deny(format!(
                "plan has {} actions, maximum is {}",
                plan.actions.len(),
                self.config.max_actions
            ));
        }
        if self.config.require_confirmation && plan.requires_confirmation {
            return PolicyDecision::deny("plan requires user confirmation");
        }
        PolicyDecision::allow()
    }

    fn check_action(&self, action: &Action) -> PolicyDecision {
        let decision = self.check_path(&action.path);
        if !decision.allowed {
            return decision;
        }
        match action.kind {
            ActionKind::Create | ActionKind::Update => self.check_extension(&action.path),
            _ => PolicyDecision::allow(),
        }
    }

    fn check_changes(&self, changes: &[FileChange]) -> PolicyDecision {
        for change in changes {
            let decision = self.check_path(&change.path);
            if !decision.allowed {
                return decision;
            }
            if change.op == ChangeOp::Delete {
                continue;
            }
            let decision = self.check_extension(&change.path);
            if !decision.allowed {
                return decision;
            }
            let size = change.content.as_ref().map(String::len).unwrap_or(0);
            if size > self.config.max_file_size {
                return PolicyDecision::deny(format!(
                    "content of {} is {} bytes, maximum is {}",
                    change.path, size, self.config.max_file_size
                ));
            }
        }
        PolicyDecision::allow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(kind: ActionKind, path: &str) -> Action {
        Action {
            id: "a1".into(),
            kind,
            path: path.into(),
            description: String::new(),
            related_files: Vec::new(),
        }
    }

    #[test]
    fn test_path_rules() {
        let policy = SafetyPolicy::default();
        assert!(policy.check_path("/src/app.ts").allowed);
        assert!(!policy.check_path("/src/../secret.ts").allowed);
        assert!(!policy.check_path("/src//a.ts").allowed);
        assert!(!policy.check_path("/a\0.ts").allowed);
        assert!(!policy.check_path("/a?.ts").allowed);
        assert!(!policy.check_path("/etc/passwd").allowed);
        assert!(!policy.check_path("C:\\Windows\\x.ts").allowed);
        assert!(!policy.check_path("/src/.git/config").allowed);
    }

    #[test]
    fn test_system_dirs_only_blocked_at_root() {
        let policy = SafetyPolicy::default();
        assert!(!policy.check_path("/dev/null").allowed);
        assert!(!policy.check_path("/bin/sh").allowed);
        assert!(!policy.check_path("/usr/bin/env").allowed);
        assert!(policy.check_path("/src/dev/tools.ts").allowed);
        assert!(policy.check_path("/packages/cli/bin/cli.js").allowed);
        assert!(policy.check_path("/src/etc/config.ts").allowed);
    }

    #[test]
    fn test_extension_allow_list() {
        let policy = SafetyPolicy::default();
        assert!(policy.check_action(&action(ActionKind::Create, "/a.tsx")).allowed);
        let denied = policy.check_action(&action(ActionKind::Create, "/run.exe"));
        assert!(!denied.allowed);
        assert!(denied.reason_or_default().contains("/run.exe"));
        // 删除不检查扩展名
        assert!(policy.check_action(&action(ActionKind::Delete, "/run.exe")).allowed);
    }

    #[test]
    fn test_empty_allow_list_disables_check() {
        let policy = SafetyPolicy::new(PolicyConfig {
            allowed_extensions: Vec::new(),
            ..PolicyConfig::default()
        });
        assert!(policy.check_changes(&[FileChange::create("/Makefile", "all:")]).allowed);
    }

    #[test]
    fn test_size_limit() {
        let policy = SafetyPolicy::new(PolicyConfig {
            max_file_size: 4,
            ..PolicyConfig::default()
        });
        assert!(policy.check_changes(&[FileChange::create("/a.ts", "1234")]).allowed);
        let d = policy.check_changes(&[FileChange::create("/a.ts", "12345")]);
        assert!(!d.allowed);
        assert!(d.reason_or_default().contains("5 bytes"));
        assert!(policy.check_changes(&[FileChange::delete("/a.ts")]).allowed);
    }

    #[test]
    fn test_plan_limits() {
        let policy = SafetyPolicy::new(PolicyConfig {
            max_actions: 1,
            require_confirmation: true,
            ..PolicyConfig::default()
        });
        let mut plan = Plan {
            actions: vec![action(ActionKind::Read, "/a.ts"), action(ActionKind::Read, "/b.ts")],
            estimated_changes: 0,
            requires_confirmation: false,
            reasoning: String::new(),
        };
        assert!(!policy.check_plan(&plan).allowed);
        plan.actions.pop();
        assert!(policy.check_plan(&plan).allowed);
        plan.requires_confirmation = true;
        assert!(!policy.check_plan(&plan).allowed);
    }
}
