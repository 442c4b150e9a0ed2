//! Classify 阶段：识别请求意图
//!
//! 解析失败时回退为低置信度的 query，而不是让整条流水线失败。

use serde::{Deserialize, Serialize};

use crate::core::{AgentError, AgentStage};
use crate::llm::LlmRequest;
use crate::pipeline::json::parse_json;
use crate::pipeline::{prompts, PhaseContext, PipelineConfig, StageLlm};

/// 意图类型（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentType {
    Create,
    Modify,
    Delete,
    Query,
    Refactor,
    Explain,
}

/// 分类结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    #[serde(rename = "type")]
    pub intent: IntentType,
    /// [0, 1]；缺省为 0.5
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub target_files: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
}

impl Classification {
    /// 解析失败时的默认分类
    pub fn fallback() -> Self {
        Self {
            intent: IntentType::Query,
            confidence: 0.5,
            target_files: Vec::new(),
            reasoning: "Could not parse classification, defaulting to query".to_string(),
        }
    }
}

fn default_confidence() -> f64 {
    0.5
}

/// 解析模型输出，confidence 夹到 [0, 1]
pub fn parse_classification(output: &str) -> Result<Classification, AgentError> {
    let mut classification: Classification = parse_json(output)?;
    classification.confidence = if classification.confidence.is_finite() {
        classification.confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };
    Ok(classification)
}

/// 调用 LLM 分类；LLM 调用本身的错误照常返回
pub async fn classify(
    llm: &StageLlm<'_>,
    ctx: &PhaseContext,
    config: &PipelineConfig,
) -> Result<Classification, AgentError> {
    let request = LlmRequest::user(prompts::classify_prompt(ctx, config)).with_system(prompts::CLASSIFY_SYSTEM);
    let output = llm.call(AgentStage::Intent, request).await?;
    match parse_classification(&output) {
        Ok(c) => {
            tracing::info!(intent = ?c.intent, confidence = c.confidence, "Request classified");
            Ok(c)
        }
        Err(e) => {
            tracing::warn!("Classification fallback: {}", e);
            Ok(Classification::fallback())
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::events::EventBus;
    use crate::llm::MockLlmClient;

    #[test]
    fn test_parse_and_clamp() {
        let c = parse_classification(
            r#"{"type":"create","confidence":1.7,"targetFiles":["/src/App.tsx"],"reasoning":"new component"}"#,
        )
        .unwrap();
        assert_eq!(c.intent, IntentType::Create);
        assert_eq!(c.confidence, 1.0);
        assert_eq!(c.target_files, vec!["/src/App.tsx"]);

        let c = parse_classification(r#"{"type":"explain","confidence":-3}"#).unwrap();
        assert_eq!(c.confidence, 0.0);
        assert!(c.target_files.is_empty());
    }

    #[test]
    fn test_missing_confidence_keeps_intent() {
        let c = parse_classification(r#"{"type":"create"}"#).unwrap();
        assert_eq!(c.intent, IntentType::Create);
        assert_eq!(c.confidence, 0.5);
    }

    #[test]
    fn test_unknown_type_is_error() {
        assert!(parse_classification(r#"{"type":"dance","confidence":0.9}"#).is_err());
    }

    #[tokio::test]
    async fn test_classify_falls_back_on_garbage() {
        let llm = MockLlmClient::with_replies(["I think you want a button."]);
        let bus = EventBus::new();
        let cancel = CancellationToken::new();
        let stage = StageLlm::new(&llm, &bus, &cancel);
        let ctx = PhaseContext::new("add a button", Default::default(), Vec::new(), Default::default());

        let c = classify(&stage, &ctx, &PipelineConfig::default()).await.unwrap();
        assert_eq!(c.intent, IntentType::Query);
        assert_eq!(c.confidence, 0.5);
        assert!(c.target_files.is_empty());
    }

    #[tokio::test]
    async fn test_classify_prompt_carries_request() {
        let llm = MockLlmClient::with_replies([r#"{"type":"modify","confidence":0.8}"#]);
        let bus = EventBus::new();
        let cancel = CancellationToken::new();
        let stage = StageLlm::new(&llm, &bus, &cancel);
        let ctx = PhaseContext::new("rename the header", Default::default(), Vec::new(), Default::default());

        let c = classify(&stage, &ctx, &PipelineConfig::default()).await.unwrap();
        assert_eq!(c.intent, IntentType::Modify);
        let sent = &llm.requests()[0];
        assert!(sent.messages[0].content.contains("rename the header"));
        assert_eq!(sent.system_prompt.as_deref(), Some(prompts::CLASSIFY_SYSTEM));
    }
}
