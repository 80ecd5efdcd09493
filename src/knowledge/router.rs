//! Router Query Engine
//!
//! 도구 설명 목록을 LLM에 보여주고 JSON으로 하나를 고르게 한 뒤,
//! 선택된 질의 엔진에 질의를 넘깁니다.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::gemini::LlmProvider;

use super::document::Response;
use super::index::QueryEngine;
use super::prompts::{PromptKind, PromptTemplates};

/// 요약 도구 설명
pub const SUMMARY_TOOL_DESCRIPTION: &str =
    "Useful for summarization questions related to the data source";

/// 벡터 도구 설명
pub const VECTOR_TOOL_DESCRIPTION: &str =
    "Useful for retrieving specific context related to the data source";

/// 응답 메타데이터 키
pub const SELECTED_TOOL_KEY: &str = "selected_tool";
pub const SELECTOR_REASON_KEY: &str = "selector_reason";

// ============================================================================
// Tools / Selection
// ============================================================================

/// 설명이 붙은 질의 엔진
#[derive(Clone)]
pub struct QueryEngineTool {
    pub description: String,
    pub engine: Arc<dyn QueryEngine>,
}

impl QueryEngineTool {
    pub fn new(engine: Arc<dyn QueryEngine>, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            engine,
        }
    }
}

/// 선택 결과 (index는 0부터)
#[derive(Debug, Clone, PartialEq)]
pub struct SingleSelection {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
struct RawSelection {
    choice: RawChoice,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawChoice {
    Number(u64),
    Text(String),
}

/// 선택기 출력 파싱 (`{"choice": 1, "reason": "..."}`, 1부터 시작)
///
/// 코드 블록이나 앞뒤 문장이 섞여 있어도 첫 `{`부터 마지막 `}`까지를 JSON으로 읽습니다.
pub fn parse_selection(output: &str, num_choices: usize) -> Result<SingleSelection> {
    let start = output.find('{');
    let end = output.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &output[s..=e],
        _ => anyhow::bail!("Selector output has no JSON object: {:?}", output.trim()),
    };

    let raw: RawSelection = serde_json::from_str(json)
        .with_context(|| format!("Failed to parse selector output: {}", json))?;

    let choice = match raw.choice {
        RawChoice::Number(n) => n as usize,
        RawChoice::Text(s) => s
            .trim()
            .parse::<usize>()
            .with_context(|| format!("Invalid choice value: {:?}", s))?,
    };

    if choice == 0 || choice > num_choices {
        anyhow::bail!("Selector chose {} but only {} choices exist", choice, num_choices);
    }

    Ok(SingleSelection {
        index: choice - 1,
        reason: raw.reason,
    })
}

/// LLM 단일 선택기
pub struct LlmSingleSelector {
    llm: Arc<dyn LlmProvider>,
    templates: Arc<PromptTemplates>,
}

impl LlmSingleSelector {
    pub fn new(llm: Arc<dyn LlmProvider>, templates: Arc<PromptTemplates>) -> Self {
        Self { llm, templates }
    }

    pub async fn select(&self, descriptions: &[&str], query: &str) -> Result<SingleSelection> {
        let context_list = descriptions
            .iter()
            .enumerate()
            .map(|(i, d)| format!("({}) {}", i + 1, d))
            .collect::<Vec<_>>()
            .join("\n\n");

        let vars = BTreeMap::from([
            ("num_choices", descriptions.len().to_string()),
            ("context_list", context_list),
            ("query_str", query.to_string()),
        ]);
        let prompt = self.templates.render(PromptKind::SingleSelect, &vars)?;

        let output = self.llm.complete(&prompt).await?;
        parse_selection(&output, descriptions.len())
    }
}

// ============================================================================
// RouterQueryEngine
// ============================================================================

/// 라우터 질의 엔진
pub struct RouterQueryEngine {
    selector: LlmSingleSelector,
    tools: Vec<QueryEngineTool>,
}

impl RouterQueryEngine {
    pub fn new(selector: LlmSingleSelector, tools: Vec<QueryEngineTool>) -> Result<Self> {
        if tools.is_empty() {
            anyhow::bail!("Router needs at least one query engine tool");
        }
        Ok(Self { selector, tools })
    }
}

#[async_trait]
impl QueryEngine for RouterQueryEngine {
    async fn query(&self, query: &str) -> Result<Response> {
        let descriptions: Vec<&str> = self.tools.iter().map(|t| t.description.as_str()).collect();
        let selection = self.selector.select(&descriptions, query).await?;
        let tool = &self.tools[selection.index];

        tracing::info!(
            "Selecting query engine {}: {}",
            selection.index,
            selection.reason
        );

        let mut response = tool.engine.query(query).await?;
        response
            .metadata
            .insert(SELECTED_TOOL_KEY.to_string(), tool.description.clone());
        response
            .metadata
            .insert(SELECTOR_REASON_KEY.to_string(), selection.reason);
        Ok(response)
    }
}

// ============================================================================
// Tests
// ============================================================================
