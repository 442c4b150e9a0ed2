//! 导入说明符提取与解析
//!
//! 扫描四种语法：`import … from '…'`（含副作用 `import '…'`）、`export … from '…'`、
//! `import('…')`、`require('…')`。裸模块（不以 `.` 或 `/` 开头）一律排除。
//! 解析只按固定顺序探测：精确路径 → 追加扩展名 → 追加 index 文件，不做任何猜测。

use std::collections::BTreeSet;

use regex::Regex;

/// 解析器配置：扩展名与 index 文件的探测顺序
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolverConfig {
    pub extensions: Vec<String>,
    pub index_files: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            extensions: vec![".ts".into(), ".tsx".into(), ".js".into(), ".jsx".into()],
            index_files: vec![
                "/index.ts".into(),
                "/index.tsx".into(),
                "/index.js".into(),
                "/index.jsx".into(),
            ],
        }
    }
}

/// 说明符是否为裸模块（npm 包名等）
pub fn is_bare_specifier(specifier: &str) -> bool {
    !specifier.starts_with('.') && !specifier.starts_with('/')
}

/// 导入解析器：持有编译好的正则与探测配置
#[derive(Clone, Debug)]
pub struct DependencyResolver {
    config: ResolverConfig,
    patterns: Vec<Regex>,
}

impl DependencyResolver {
    pub fn new(config: ResolverConfig) -> Self {
        // 这些正则是常量，编译失败只可能是代码错误
        let sources = [
            r#"\bimport\s+(?:type\s+)?[\w\s{},*$]*?\bfrom\s*['"]([^'"\n]+)['"]"#,
            r#"\bimport\s*['"]([^'"\n]+)['"]"#,
            r#"\bexport\s+(?:type\s+)?[\w\s{},*$]*?\bfrom\s*['"]([^'"\n]+)['"]"#,
            r#"\bimport\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#,
            r#"\brequire\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#,
        ];
        let patterns = sources
            .iter()
            .filter_map(|src| match Regex::new(src) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::error!("invalid import pattern {}: {}", src, e);
                    None
                }
            })
            .collect();
        Self { config, patterns }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// 提取去重后的非裸模块说明符
    pub fn extract_specifiers(&self, content: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        for re in &self.patterns {
            for caps in re.captures_iter(content) {
                if let Some(m) = caps.get(1) {
                    let spec = m.as_str().trim();
                    if !spec.is_empty() && !is_bare_specifier(spec) {
                        found.insert(spec.to_string());
                    }
                }
            }
        }
        found
    }

    /// 解析说明符为已知路径；找不到（外部或损坏的导入）返回 None
    pub fn resolve_specifier(
        &self,
        specifier: &str,
        importer: &str,
        known: &BTreeSet<String>,
    ) -> Option<String> {
        if is_bare_specifier(specifier) {
            return None;
        }

        let candidate = if specifier.starts_with('/') {
            specifier.to_string()
        } else {
            join_relative(importer, specifier)
        };

        if known.contains(&candidate) {
            return Some(candidate);
        }
        for ext in &self.config.extensions {
            let probe = format!("{}{}", candidate, ext);
            if known.contains(&probe) {
                return Some(probe);
            }
        }
        let base = candidate.trim_end_matches('/');
        for index in &self.config.index_files {
            let probe = format!("{}{}", base, index);
            if known.contains(&probe) {
                return Some(probe);
            }
        }
        None
    }
}

impl Default for DependencyResolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

/// 以导入方所在目录为基准，用栈处理 `.` / `..` 段，得到绝对路径
fn join_relative(importer: &str, specifier: &str) -> String {
    let dir = match importer.rfind('/') {
        Some(idx) => &importer[..idx],
        None => "",
    };
    let mut stack: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in specifier.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }
    format!("/{}", stack.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_extract_all_syntaxes() {
        let resolver = DependencyResolver::default();
        let src = r#"
import React from 'react';
import { a, b } from "./utils";
import type { T } from './types';
import * as ns from '../lib/ns';
import './styles.css';
import {
  multi,
  line,
} from './multi';
export { x } from './reexport';
export * from "/abs/mod";
const lazy = import('./lazy');
const old = require("../legacy");
const dup = require('./utils');
"#;
        let specs = resolver.extract_specifiers(src);
        let expected: BTreeSet<String> = [
            "./utils",
            "./types",
            "../lib/ns",
            "./styles.css",
            "./multi",
            "./reexport",
            "/abs/mod",
            "./lazy",
            "../legacy",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(specs, expected);
    }

    #[test]
    fn test_bare_modules_excluded() {
        let resolver = DependencyResolver::default();
        let specs = resolver.extract_specifiers("import x from 'lodash';\nconst y = require('fs');");
        assert!(specs.is_empty());
    }

    #[test]
    fn test_export_without_from_not_matched() {
        let resolver = DependencyResolver::default();
        let specs = resolver.extract_specifiers("export const a = 1;\nexport default function f() {}\n");
        assert!(specs.is_empty());
    }

    #[test]
    fn test_join_relative() {
        assert_eq!(join_relative("/src/a/b.ts", "./c"), "/src/a/c");
        assert_eq!(join_relative("/src/a/b.ts", "../c"), "/src/c");
        assert_eq!(join_relative("/src/a/b.ts", "../../../../c"), "/c");
        assert_eq!(join_relative("/b.ts", "./x/./y"), "/x/y");
    }

    #[test]
    fn test_resolve_probe_order() {
        let resolver = DependencyResolver::default();
        let k = known(&["/src/b.tsx", "/src/b.ts", "/src/dir/index.js", "/src/exact"]);
        assert_eq!(resolver.resolve_specifier("./b", "/src/a.ts", &k).as_deref(), Some("/src/b.ts"));
        assert_eq!(
            resolver.resolve_specifier("./dir", "/src/a.ts", &k).as_deref(),
            Some("/src/dir/index.js")
        );
        assert_eq!(resolver.resolve_specifier("./exact", "/src/a.ts", &k).as_deref(), Some("/src/exact"));
        assert_eq!(resolver.resolve_specifier("/src/b", "/x/y.ts", &k).as_deref(), Some("/src/b.ts"));
    }

    #[test]
    fn test_resolve_missing_and_bare() {
        let resolver = DependencyResolver::default();
        let k = known(&["/src/b.ts"]);
        assert_eq!(resolver.resolve_specifier("./missing", "/src/a.ts", &k), None);
        assert_eq!(resolver.resolve_specifier("react", "/src/a.ts", &k), None);
    }

    #[test]
    fn test_custom_extensions() {
        let resolver = DependencyResolver::new(ResolverConfig {
            extensions: vec![".vue".into()],
            index_files: vec![],
        });
        let k = known(&["/c.vue", "/c.ts"]);
        assert_eq!(resolver.resolve_specifier("./c", "/a.ts", &k).as_deref(), Some("/c.vue"));
    }
}
