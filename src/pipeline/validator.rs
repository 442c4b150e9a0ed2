//! Validate 阶段：确认变更与请求在路径层面一致，并生成四段式摘要
//!
//! generate 阶段收集的错误总是追加到结果里，并强制 valid = false。

use serde::{Deserialize, Deserializer, Serialize};

use crate::core::{AgentError, AgentStage};
use crate::llm::LlmRequest;
use crate::pipeline::json::parse_json;
use crate::pipeline::{prompts, Classification, ExecutionResult, PhaseContext, StageLlm};

/// 面向用户的四段式摘要
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationSummary {
    pub overview: String,
    #[serde(deserialize_with = "string_or_list")]
    pub files_touched: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub key_changes: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub went_well: Vec<String>,
}

/// 校验结论
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    pub valid: bool,
    #[serde(default)]
    pub summary: ValidationSummary,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// 模型有时把列表写成一段文字
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) if s.trim().is_empty() => Vec::new(),
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

pub fn parse_validation(output: &str) -> Result<Validation, AgentError> {
    parse_json(output)
}

impl Validation {
    /// 追加执行错误；有任何执行错误时 valid 一律为 false
    pub fn merge_execution_errors(&mut self, errors: &[String]) {
        if errors.is_empty() {
            return;
        }
        self.errors.extend(errors.iter().cloned());
        self.valid = false;
    }

    /// 渲染成给用户看的文本；execution_errors > 0 时加前言
    pub fn render(&self, execution_errors: usize) -> String {
        let mut out = String::new();
        if execution_errors > 0 {
            out.push_str(&format!(
                "Completed with {} execution error(s); the affected actions were not applied.\n\n",
                execution_errors
            ));
        }
        out.push_str(&format!("## Overview\n{}\n", self.summary.overview));
        push_section(&mut out, "Files touched", &self.summary.files_touched);
        push_section(&mut out, "Key changes", &self.summary.key_changes);
        push_section(&mut out, "What went well", &self.summary.went_well);
        push_section(&mut out, "Errors", &self.errors);
        out
    }
}

fn push_section(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("\n## {}\n", title));
    for item in items {
        out.push_str(&format!("- {}\n", item));
    }
}

pub async fn validate(
    llm: &StageLlm<'_>,
    ctx: &PhaseContext,
    classification: &Classification,
    execution: &ExecutionResult,
) -> Result<Validation, AgentError> {
    let request = LlmRequest::user(prompts::validate_prompt(ctx, classification, execution))
        .with_system(prompts::VALIDATE_SYSTEM);
    let output = llm.call(AgentStage::Validating, request).await?;
    let mut validation = parse_validation(&output)?;
    validation.merge_execution_errors(&execution.errors);
    tracing::info!(
        valid = validation.valid,
        errors = validation.errors.len(),
        "Validation finished"
    );
    Ok(validation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lenient_summary() {
        let v = parse_validation(
            r#"{"valid":true,"summary":{"overview":"Added a button","filesTouched":"/src/Button.tsx","keyChanges":["new component"]}}"#,
        )
        .unwrap();
        assert!(v.valid);
        assert_eq!(v.summary.files_touched, vec!["/src/Button.tsx"]);
        assert!(v.summary.went_well.is_empty());
        assert!(v.errors.is_empty());
    }

    #[test]
    fn test_parse_failure_is_error() {
        assert!(matches!(parse_validation("looks fine to me"), Err(AgentError::JsonParseError(_))));
    }

    #[test]
    fn test_execution_errors_force_invalid() {
        let mut v = parse_validation(r#"{"valid":true,"summary":{"overview":"ok"},"errors":["minor"]}"#).unwrap();
        v.merge_execution_errors(&["create /x.exe failed: Policy violation".to_string()]);
        assert!(!v.valid);
        assert_eq!(v.errors.len(), 2);

        let text = v.render(1);
        assert!(text.starts_with("Completed with 1 execution error(s)"));
        assert!(text.contains("## Errors\n- minor\n- create /x.exe failed"));
    }

    #[test]
    fn test_render_without_errors_has_no_preamble() {
        let v = parse_validation(r#"{"valid":true,"summary":{"overview":"ok","wentWell":["fast"]}}"#).unwrap();
        let text = v.render(0);
        assert!(text.starts_with("## Overview\nok"));
        assert!(text.contains("## What went well\n- fast"));
        assert!(!text.contains("## Errors"));
    }
}
