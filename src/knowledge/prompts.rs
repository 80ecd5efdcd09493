//! Prompt Templates - handlebars 기반 프롬프트
//!
//! 모든 템플릿은 HTML 이스케이프 없이, strict 모드로 렌더링합니다 (변수 누락 시 에러).

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use handlebars::Handlebars;

use crate::config::PromptSettings;

use super::chunker::{estimate_tokens, Chunker, TokenTextSplitter};

/// 문서 요약 생성용 질의
pub const SUMMARY_QUERY: &str = "Describe what the provided text is about. \
Also describe some of the questions that this text can answer.";

const TEXT_QA_TMPL: &str = "Context information is below.
---------------------
{{context_str}}
---------------------
Given the context information and not prior knowledge, answer the question \
in the same language as the question.
Question: {{query_str}}
Answer: ";

const REFINE_TMPL: &str = "The original question is as follows: {{query_str}}
We have provided an existing answer: {{existing_answer}}
We have the opportunity to refine the existing answer (only if needed) with some more context below.
------------
{{context_msg}}
------------
Given the new context, refine the original answer to better answer the question. \
If the context isn't useful, return the original answer.
Refined Answer: ";

const TREE_SUMMARIZE_TMPL: &str = "Context information from multiple sources is below.
---------------------
{{context_str}}
---------------------
Given the information from multiple sources and not prior knowledge, answer the query \
in the same language as the query.
Query: {{query_str}}
Answer: ";

const CHOICE_SELECT_TMPL: &str = "A list of documents is shown below. Each document has a number next to it along \
with a summary of the document. A question is also provided.
Respond with the numbers of the documents you should consult to answer the question, in order of relevance, \
as well as the relevance score. The relevance score is a number from 1-10 based on how relevant you think \
the document is to the question.
Do not include any documents that are not relevant to the question.
Example format:
Document 1:
<summary of document 1>

Document 2:
<summary of document 2>

...

Document 10:
<summary of document 10>

Question: <question>
Answer:
Doc: 9, Relevance: 7
Doc: 3, Relevance: 4
Doc: 7, Relevance: 3

Let's try this now:

{{context_str}}
Question: {{query_str}}
Answer:
";

const SINGLE_SELECT_TMPL: &str = "Some choices are given below. It is provided in a numbered list \
(1 to {{num_choices}}), where each item in the list corresponds to a summary.
---------------------
{{context_list}}
---------------------
Using only the choices above and not prior knowledge, return the choice that is most relevant \
to the question: '{{query_str}}'

Respond with a single JSON object and nothing else, in this format:
{\"choice\": <choice number>, \"reason\": \"<why this choice fits the question>\"}
";

// ============================================================================
// PromptKind / PromptTemplates
// ============================================================================

/// 프롬프트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// 컨텍스트 기반 질의응답 (`context_str`, `query_str`)
    TextQa,
    /// 기존 답변 보강 (`query_str`, `existing_answer`, `context_msg`)
    Refine,
    /// 여러 출처 요약 (`context_str`, `query_str`)
    TreeSummarize,
    /// 요약 목록에서 문서 선택 (`context_str`, `query_str`)
    ChoiceSelect,
    /// 라우터 도구 선택 (`num_choices`, `context_list`, `query_str`)
    SingleSelect,
}

impl PromptKind {
    const ALL: [PromptKind; 5] = [
        PromptKind::TextQa,
        PromptKind::Refine,
        PromptKind::TreeSummarize,
        PromptKind::ChoiceSelect,
        PromptKind::SingleSelect,
    ];

    fn name(self) -> &'static str {
        match self {
            PromptKind::TextQa => "text_qa",
            PromptKind::Refine => "refine",
            PromptKind::TreeSummarize => "tree_summarize",
            PromptKind::ChoiceSelect => "choice_select",
            PromptKind::SingleSelect => "single_select",
        }
    }

    fn template(self) -> &'static str {
        match self {
            PromptKind::TextQa => TEXT_QA_TMPL,
            PromptKind::Refine => REFINE_TMPL,
            PromptKind::TreeSummarize => TREE_SUMMARIZE_TMPL,
            PromptKind::ChoiceSelect => CHOICE_SELECT_TMPL,
            PromptKind::SingleSelect => SINGLE_SELECT_TMPL,
        }
    }

    /// 컨텍스트 변수 이름 (재패킹 대상)
    pub fn context_var(self) -> &'static str {
        match self {
            PromptKind::Refine => "context_msg",
            PromptKind::SingleSelect => "context_list",
            _ => "context_str",
        }
    }
}

/// 등록된 프롬프트 템플릿 모음
pub struct PromptTemplates {
    registry: Handlebars<'static>,
}

impl PromptTemplates {
    pub fn new() -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry.set_strict_mode(true);

        for kind in PromptKind::ALL {
            registry
                .register_template_string(kind.name(), kind.template())
                .with_context(|| format!("Failed to register template {}", kind.name()))?;
        }

        Ok(Self { registry })
    }

    /// 템플릿 렌더링
    pub fn render(&self, kind: PromptKind, vars: &BTreeMap<&str, String>) -> Result<String> {
        self.registry
            .render(kind.name(), vars)
            .with_context(|| format!("Failed to render template {}", kind.name()))
    }

    /// 컨텍스트를 비운 상태의 템플릿 토큰 수
    pub fn template_tokens(&self, kind: PromptKind, vars: &BTreeMap<&str, String>) -> Result<usize> {
        let mut vars = vars.clone();
        vars.insert(kind.context_var(), String::new());
        Ok(estimate_tokens(&self.render(kind, &vars)?))
    }
}

// ============================================================================
// PromptHelper
// ============================================================================

/// 노드 텍스트 간 패딩 토큰
const CHUNK_PADDING: usize = 5;

/// 컨텍스트 윈도우에 맞게 텍스트를 재배치
#[derive(Debug, Clone)]
pub struct PromptHelper {
    context_window: usize,
    num_output: usize,
    chunk_overlap_ratio: f32,
}

impl PromptHelper {
    pub fn new(settings: &PromptSettings) -> Self {
        Self {
            context_window: settings.context_window,
            num_output: settings.num_output,
            chunk_overlap_ratio: settings.chunk_overlap_ratio,
        }
    }

    /// 템플릿 토큰을 제외하고 청크 하나에 쓸 수 있는 토큰 수
    pub fn available_chunk_size(&self, template_tokens: usize, num_chunks: usize) -> Result<usize> {
        let available = self
            .context_window
            .checked_sub(template_tokens + self.num_output)
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Prompt template ({} tokens) leaves no room in the context window ({})",
                    template_tokens,
                    self.context_window
                )
            })?;

        let per_chunk = available / num_chunks.max(1);
        Ok(per_chunk.saturating_sub(CHUNK_PADDING).max(1))
    }

    /// 텍스트들을 이어 붙인 뒤 윈도우 크기에 맞는 청크로 다시 나눔
    pub fn repack(&self, template_tokens: usize, texts: &[String]) -> Result<Vec<String>> {
        let chunk_size = self.available_chunk_size(template_tokens, 1)?;
        let overlap = (chunk_size as f32 * self.chunk_overlap_ratio) as usize;

        let combined = texts
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        let splitter = TokenTextSplitter::new(chunk_size, overlap);
        Ok(splitter
            .split(&combined)
            .into_iter()
            .map(|chunk| chunk.text)
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&'static str, &str)]) -> BTreeMap<&'static str, String> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn test_render_text_qa_without_escaping() {
        let templates = PromptTemplates::new().unwrap();
        let prompt = templates
            .render(
                PromptKind::TextQa,
                &vars(&[("context_str", "<b>R&D</b>"), ("query_str", "What's new?")]),
            )
            .unwrap();

        assert!(prompt.contains("<b>R&D</b>"));
        assert!(prompt.contains("Question: What's new?"));
    }

    #[test]
    fn test_render_missing_variable_is_error() {
        let templates = PromptTemplates::new().unwrap();
        let result = templates.render(PromptKind::Refine, &vars(&[("query_str", "q")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_single_select_keeps_json_braces() {
        let templates = PromptTemplates::new().unwrap();
        let prompt = templates
            .render(
                PromptKind::SingleSelect,
                &vars(&[("num_choices", "2"), ("context_list", "(1) a\n\n(2) b"), ("query_str", "q")]),
            )
            .unwrap();

        assert!(prompt.contains("(1 to 2)"));
        assert!(prompt.contains("{\"choice\": <choice number>"));
    }

    #[test]
    fn test_template_tokens_ignore_context() {
        let templates = PromptTemplates::new().unwrap();
        let base = vars(&[("query_str", "q")]);
        let a = templates.template_tokens(PromptKind::TextQa, &base).unwrap();

        let mut with_ctx = base.clone();
        with_ctx.insert("context_str", "x".repeat(400));
        let b = templates.template_tokens(PromptKind::TextQa, &with_ctx).unwrap();

        assert_eq!(a, b);
        assert!(a > 0);
    }

    #[test]
    fn test_available_chunk_size() {
        let helper = PromptHelper::new(&PromptSettings::default());
        // 3900 - 100 - 256 = 3544
        assert_eq!(helper.available_chunk_size(100, 1).unwrap(), 3544 - CHUNK_PADDING);
        assert_eq!(helper.available_chunk_size(100, 2).unwrap(), 1772 - CHUNK_PADDING);
        assert!(helper.available_chunk_size(3700, 1).is_err());
    }

    #[test]
    fn test_repack_small_texts_into_one_chunk() {
        let helper = PromptHelper::new(&PromptSettings::default());
        let texts = vec!["first part".to_string(), "  ".to_string(), "second part".to_string()];

        let packed = helper.repack(100, &texts).unwrap();
        assert_eq!(packed, vec!["first part\n\nsecond part".to_string()]);
    }

    #[test]
    fn test_repack_splits_large_input() {
        let helper = PromptHelper::new(&PromptSettings {
            context_window: 400,
            num_output: 100,
            chunk_overlap_ratio: 0.1,
        });
        let word = "abcd ".repeat(600);
        let packed = helper.repack(50, &[word]).unwrap();

        assert!(packed.len() > 1);
        for chunk in &packed {
            assert!(estimate_tokens(chunk) <= 245);
        }
    }
}
