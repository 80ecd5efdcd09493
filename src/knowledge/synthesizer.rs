//! Response Synthesizer - 검색된 노드로 답변 생성
//!
//! - `TreeSummarize`: 윈도우에 맞게 재패킹 → 청크별 요약(동시 호출) → 하나가 될 때까지 반복
//! - `Compact`: 재패킹 → 첫 청크는 text_qa, 이후 청크는 refine으로 답변 보강

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use futures::stream::{self, StreamExt, TryStreamExt};

use crate::gemini::LlmProvider;

use super::document::{NodeWithScore, Response};
use super::prompts::{PromptHelper, PromptKind, PromptTemplates};

/// 컨텍스트가 없을 때의 응답
pub const EMPTY_RESPONSE: &str = "Empty Response";

/// 합성 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    TreeSummarize,
    Compact,
}

/// 응답 합성기
pub struct ResponseSynthesizer {
    llm: Arc<dyn LlmProvider>,
    templates: Arc<PromptTemplates>,
    helper: PromptHelper,
    mode: ResponseMode,
    concurrency: usize,
}

impl ResponseSynthesizer {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        templates: Arc<PromptTemplates>,
        helper: PromptHelper,
        mode: ResponseMode,
        concurrency: usize,
    ) -> Self {
        Self {
            llm,
            templates,
            helper,
            mode,
            concurrency: concurrency.max(1),
        }
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    /// 노드들로 응답 생성
    pub async fn synthesize(&self, query: &str, nodes: Vec<NodeWithScore>) -> Result<Response> {
        let texts: Vec<String> = nodes
            .iter()
            .map(|n| n.node.content_with_metadata())
            .collect();

        let response = self.get_response(query, &texts).await?;
        Ok(Response {
            response,
            source_nodes: nodes,
            metadata: Default::default(),
        })
    }

    /// 텍스트 목록으로 답변 텍스트 생성
    pub async fn get_response(&self, query: &str, texts: &[String]) -> Result<String> {
        if texts.iter().all(|t| t.trim().is_empty()) {
            return Ok(EMPTY_RESPONSE.to_string());
        }

        match self.mode {
            ResponseMode::TreeSummarize => self.tree_summarize(query, texts).await,
            ResponseMode::Compact => self.compact_and_refine(query, texts).await,
        }
    }

    async fn tree_summarize(&self, query: &str, texts: &[String]) -> Result<String> {
        let kind = PromptKind::TreeSummarize;
        let base = query_vars(query);
        let template_tokens = self.templates.template_tokens(kind, &base)?;

        let mut texts = texts.to_vec();
        let mut level = 0usize;

        loop {
            let chunks = self.helper.repack(template_tokens, &texts)?;
            tracing::debug!("tree_summarize level {}: {} chunks", level, chunks.len());

            if chunks.len() <= 1 {
                let context = chunks.into_iter().next().unwrap_or_default();
                return self.complete(kind, &base, context).await;
            }

            let summaries: Vec<String> = stream::iter(chunks)
                .map(|chunk| self.complete(kind, &base, chunk))
                .buffered(self.concurrency)
                .try_collect()
                .await?;

            if summaries.len() >= texts.len() && level > 0 {
                // 요약이 줄지 않으면 마지막 단계에서 하나로 합침
                let joined = summaries.join("\n\n");
                return self.complete(kind, &base, joined).await;
            }

            texts = summaries;
            level += 1;
        }
    }

    async fn compact_and_refine(&self, query: &str, texts: &[String]) -> Result<String> {
        let base = query_vars(query);
        let qa_tokens = self.templates.template_tokens(PromptKind::TextQa, &base)?;
        let chunks = self.helper.repack(qa_tokens, texts)?;

        let mut answer: Option<String> = None;
        for chunk in chunks {
            answer = Some(match answer {
                None => self.complete(PromptKind::TextQa, &base, chunk).await?,
                Some(existing) => self.refine(&base, existing, chunk).await?,
            });
        }

        Ok(answer.unwrap_or_else(|| EMPTY_RESPONSE.to_string()))
    }

    async fn refine(
        &self,
        base: &BTreeMap<&'static str, String>,
        mut existing: String,
        context: String,
    ) -> Result<String> {
        let kind = PromptKind::Refine;

        let mut vars = base.clone();
        vars.insert("existing_answer", existing.clone());
        let template_tokens = self.templates.template_tokens(kind, &vars)?;

        for piece in self.helper.repack(template_tokens, &[context])? {
            let mut vars = base.clone();
            vars.insert("existing_answer", existing);
            existing = self.complete(kind, &vars, piece).await?;
        }

        Ok(existing)
    }

    async fn complete(
        &self,
        kind: PromptKind,
        vars: &BTreeMap<&'static str, String>,
        context: String,
    ) -> Result<String> {
        let mut vars = vars.clone();
        vars.insert(kind.context_var(), context);
        let prompt = self.templates.render(kind, &vars)?;

        let answer = self.llm.complete(&prompt).await?;
        Ok(answer.trim().to_string())
    }
}

fn query_vars(query: &str) -> BTreeMap<&'static str, String> {
    BTreeMap::from([("query_str", query.to_string())])
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PromptSettings;
    use crate::knowledge::document::Node;
    use crate::testing::ScriptedLlm;

    fn synthesizer(llm: Arc<ScriptedLlm>, mode: ResponseMode, window: usize) -> ResponseSynthesizer {
        ResponseSynthesizer::new(
            llm,
            Arc::new(PromptTemplates::new().unwrap()),
            PromptHelper::new(&PromptSettings {
                context_window: window,
                num_output: 64,
                chunk_overlap_ratio: 0.0,
            }),
            mode,
            2,
        )
    }

    fn node(id: &str, text: &str) -> NodeWithScore {
        NodeWithScore::new(
            Node {
                node_id: id.to_string(),
                ref_doc_id: "doc".to_string(),
                text: text.to_string(),
                start_char_idx: Some(0),
                end_char_idx: Some(text.chars().count()),
                metadata: Default::default(),
            },
            Some(0.5),
        )
    }

    #[tokio::test]
    async fn test_tree_summarize_single_call_when_fits() {
        let llm = Arc::new(ScriptedLlm::constant("  summary  "));
        let synth = synthesizer(llm.clone(), ResponseMode::TreeSummarize, 3900);

        let response = synth
            .synthesize("what?", vec![node("a", "alpha"), node("b", "beta")])
            .await
            .unwrap();

        assert_eq!(response.response, "summary");
        assert_eq!(response.source_nodes.len(), 2);
        assert_eq!(llm.calls(), 1);

        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("alpha\n\nbeta"));
        assert!(prompt.contains("Query: what?"));
    }

    #[tokio::test]
    async fn test_tree_summarize_reduces_multiple_chunks() {
        let llm = Arc::new(ScriptedLlm::constant("short"));
        let synth = synthesizer(llm.clone(), ResponseMode::TreeSummarize, 400);

        let long = "word ".repeat(400);
        let answer = synth
            .get_response("q", &[long.clone(), long])
            .await
            .unwrap();

        assert_eq!(answer, "short");
        // 첫 단계에서 여러 청크 요약 + 마지막 합치기
        assert!(llm.calls() > 2);
    }

    #[tokio::test]
    async fn test_compact_refines_after_first_chunk() {
        let llm = Arc::new(ScriptedLlm::new(|prompt| {
            if prompt.contains("Refined Answer:") {
                "refined".to_string()
            } else {
                "initial".to_string()
            }
        }));
        let synth = synthesizer(llm.clone(), ResponseMode::Compact, 400);

        let long = "token ".repeat(500);
        let answer = synth.get_response("q", &[long]).await.unwrap();

        assert_eq!(answer, "refined");
        let prompts = llm.prompts();
        assert!(prompts.len() >= 2);
        assert!(prompts[0].starts_with("Context information is below."));
        assert!(prompts[1].contains("existing answer: initial"));
    }

    #[tokio::test]
    async fn test_compact_single_chunk_uses_text_qa_only() {
        let llm = Arc::new(ScriptedLlm::constant("answer"));
        let synth = synthesizer(llm.clone(), ResponseMode::Compact, 3900);

        let answer = synth
            .get_response("q", &["one".to_string(), "two".to_string()])
            .await
            .unwrap();

        assert_eq!(answer, "answer");
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_context() {
        let llm = Arc::new(ScriptedLlm::constant("unused"));
        let synth = synthesizer(llm.clone(), ResponseMode::Compact, 3900);

        let response = synth.synthesize("q", vec![]).await.unwrap();
        assert_eq!(response.response, EMPTY_RESPONSE);
        assert_eq!(llm.calls(), 0);
    }
}
