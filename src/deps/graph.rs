//! 依赖图：正向（dependencies）与反向（dependents）邻接表
//!
//! 每次请求从当前文件集合重新构建，不缓存、不持久化。环只记录，不拒绝。

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::config::SummaryLimit;
use crate::deps::resolver::DependencyResolver;
use crate::vfs::FileState;

/// 双向依赖图；两个表的值都已去重并按字典序排序
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DependencyGraph {
    pub dependencies: BTreeMap<String, Vec<String>>,
    pub dependents: BTreeMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn dependencies_of(&self, path: &str) -> &[String] {
        self.dependencies.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn dependents_of(&self, path: &str) -> &[String] {
        self.dependents.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 在任一方向上至少有一条边
    pub fn has_edges(&self, path: &str) -> bool {
        !self.dependencies_of(path).is_empty() || !self.dependents_of(path).is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.dependencies.values().map(Vec::len).sum()
    }
}

impl DependencyResolver {
    /// 为所有文件构建依赖图；无法解析的说明符直接忽略，永不失败
    pub fn build_graph(&self, files: &FileState) -> DependencyGraph {
        let known: BTreeSet<String> = files.keys().cloned().collect();
        let mut forward: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut reverse: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for path in files.keys() {
            forward.entry(path.clone()).or_default();
            reverse.entry(path.clone()).or_default();
        }

        for (path, file) in files {
            for spec in self.extract_specifiers(&file.content) {
                let Some(target) = self.resolve_specifier(&spec, path, &known) else {
                    continue;
                };
                if &target == path {
                    continue;
                }
                forward.entry(path.clone()).or_default().insert(target.clone());
                reverse.entry(target).or_default().insert(path.clone());
            }
        }

        DependencyGraph {
            dependencies: forward
                .into_iter()
                .map(|(k, v)| (k, v.into_iter().collect()))
                .collect(),
            dependents: reverse
                .into_iter()
                .map(|(k, v)| (k, v.into_iter().collect()))
                .collect(),
        }
    }
}

/// 渲染供 Prompt 使用的依赖摘要：只列有边的路径（字典序），超出上限时附省略计数
pub fn format_for_prompt(graph: &DependencyGraph, limit: SummaryLimit) -> String {
    let connected: Vec<&String> = graph
        .dependencies
        .keys()
        .chain(graph.dependents.keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter(|p| graph.has_edges(p))
        .collect();

    if connected.is_empty() {
        return "No internal dependencies detected.".to_string();
    }

    let shown = limit.apply(connected.len());
    let mut out = String::new();
    for path in connected.iter().take(shown) {
        out.push_str(&format!("{}\n", path));
        let deps = graph.dependencies_of(path);
        if !deps.is_empty() {
            out.push_str(&format!("  imports: {}\n", deps.join(", ")));
        }
        let users = graph.dependents_of(path);
        if !users.is_empty() {
            out.push_str(&format!("  imported by: {}\n", users.join(", ")));
        }
    }
    let omitted = connected.len() - shown;
    if omitted > 0 {
        out.push_str(&format!("... and {} more files with dependencies\n", omitted));
    }
    out
}
