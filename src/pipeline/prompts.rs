//! 各阶段的 system prompt 与 user prompt 拼接

use crate::deps::format_for_prompt;
use crate::pipeline::summary::{summarize_conversation, summarize_files, summarize_manifest};
use crate::pipeline::{Action, Classification, ExecutionResult, PhaseContext, PipelineConfig};
use crate::vfs::VirtualFile;

pub const CLASSIFY_SYSTEM: &str = r#"You classify requests against a small in-memory web project.
Respond with a single JSON object and nothing else:
{"type": "create|modify|delete|query|refactor|explain", "confidence": 0.0-1.0, "targetFiles": ["/path"], "reasoning": "..."}"#;

pub const PLAN_SYSTEM: &str = r#"You plan file operations for an in-memory web project.
Respond with a single JSON object and nothing else:
{"actions": [{"id": "1", "type": "create|update|delete|read", "path": "/path", "description": "...", "relatedFiles": ["/path"]}],
 "estimatedChanges": 1, "requiresConfirmation": false, "reasoning": "..."}
Use absolute paths starting with "/". Keep the plan minimal and ordered."#;

pub const GENERATE_SYSTEM: &str = r#"You write complete source files for an in-memory web project.
Return the full file content wrapped in a single tag:
<file_content path="/path">
...file content...
</file_content>
Do not use markdown code fences inside the tag."#;

pub const VALIDATE_SYSTEM: &str = r#"You review whether the applied changes match the request.
Respond with a single JSON object and nothing else:
{"valid": true, "summary": {"overview": "...", "filesTouched": ["/path"], "keyChanges": ["..."], "wentWell": ["..."]}, "errors": ["..."]}"#;

fn project_overview(ctx: &PhaseContext, config: &PipelineConfig) -> String {
    format!(
        "## Files\n{}\n## Dependencies\n{}\n## Manifest\n{}\n## Conversation\n{}",
        summarize_files(&ctx.files, config.max_files_in_summary),
        format_for_prompt(&ctx.graph, config.max_graph_entries),
        summarize_manifest(&ctx.files),
        summarize_conversation(&ctx.messages, config.max_conversation_messages, config.max_message_chars),
    )
}

pub fn classify_prompt(ctx: &PhaseContext, config: &PipelineConfig) -> String {
    format!("{}\n## Request\n{}\n", project_overview(ctx, config), ctx.request)
}

pub fn plan_prompt(ctx: &PhaseContext, classification: &Classification, config: &PipelineConfig) -> String {
    let classification_json = serde_json::to_string_pretty(classification).unwrap_or_default();
    format!(
        "{}\n## Request\n{}\n\n## Classification\n{}\n",
        project_overview(ctx, config),
        ctx.request,
        classification_json
    )
}

/// existing 为 None 表示新建
pub fn generate_prompt(
    ctx: &PhaseContext,
    action: &Action,
    existing: Option<&VirtualFile>,
    related: &[&VirtualFile],
    config: &PipelineConfig,
) -> String {
    let mut out = format!(
        "## Request\n{}\n\n## Action\n{} {}: {}\n\n## Dependencies\n{}\n",
        ctx.request,
        action.kind.as_str(),
        action.path,
        action.description,
        format_for_prompt(&ctx.graph, config.max_graph_entries),
    );
    for file in related {
        out.push_str(&format!("\n## Related file {}\n{}\n", file.path, file.content));
    }
    match existing {
        Some(file) => out.push_str(&format!(
            "\n## Current content of {}\n{}\n\nRewrite the whole file with the requested change applied.\n",
            file.path, file.content
        )),
        None => out.push_str(&format!("\nWrite the complete content of the new file {}.\n", action.path)),
    }
    out
}

pub fn validate_prompt(ctx: &PhaseContext, classification: &Classification, execution: &ExecutionResult) -> String {
    let classification_json = serde_json::to_string_pretty(classification).unwrap_or_default();
    let changed = if execution.changed_paths.is_empty() {
        "(none)".to_string()
    } else {
        execution.changed_paths.join("\n")
    };
    let errors = if execution.errors.is_empty() {
        "(none)".to_string()
    } else {
        execution.errors.join("\n")
    };
    format!(
        "## Request\n{}\n\n## Classification\n{}\n\n## Changed files\n{}\n\n## Execution errors\n{}\n",
        ctx.request, classification_json, changed, errors
    )
}
