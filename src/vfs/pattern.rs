//! 文件路径匹配：glob 或正则

use std::str::FromStr;

use crate::core::AgentError;

/// 路径匹配模式；`re:` 前缀表示正则，其余按 glob 解析
#[derive(Clone, Debug)]
pub enum FilePattern {
    Glob(glob::Pattern),
    Regex(regex::Regex),
}

impl FilePattern {
    pub fn glob(pattern: &str) -> Result<Self, AgentError> {
        glob::Pattern::new(pattern)
            .map(FilePattern::Glob)
            .map_err(|e| AgentError::InvalidPattern(format!("{}: {}", pattern, e)))
    }

    pub fn regex(pattern: &str) -> Result<Self, AgentError> {
        regex::Regex::new(pattern)
            .map(FilePattern::Regex)
            .map_err(|e| AgentError::InvalidPattern(format!("{}: {}", pattern, e)))
    }

    pub fn parse(pattern: &str) -> Result<Self, AgentError> {
        match pattern.strip_prefix("re:") {
            Some(re) => Self::regex(re),
            None => Self::glob(pattern),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            // `*` 不跨越目录，`**` 才跨越
            FilePattern::Glob(p) => p.matches_with(
                path,
                glob::MatchOptions {
                    case_sensitive: true,
                    require_literal_separator: true,
                    require_literal_leading_dot: false,
                },
            ),
            FilePattern::Regex(re) => re.is_match(path),
        }
    }
}

impl FromStr for FilePattern {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
