//! Document Summary Index
//!
//! 문서마다 LLM 요약을 하나씩 만들어 저장합니다.
//! 질의 시 LLM이 요약 목록에서 관련 문서를 고르고(choice select),
//! 고른 문서의 노드로 tree_summarize 답변을 만듭니다.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use regex::Regex;

use crate::context::ServiceContext;

use super::docstore::IndexKind;
use super::document::{Node, NodeWithScore, Response};
use super::index::{BaseIndex, QueryEngine};
use super::prompts::{PromptKind, SUMMARY_QUERY};
use super::storage::StorageContext;
use super::synthesizer::{ResponseMode, EMPTY_RESPONSE};

/// `Doc: 3, Relevance: 7` 형식의 응답 줄
const CHOICE_LINE: &str = r"(?i)doc(?:ument)?\s*:?\s*(\d+)\s*,\s*relevance\s*:?\s*(\d+(?:\.\d+)?)";

// ============================================================================
// DocumentSummaryIndex
// ============================================================================

/// 문서 요약 인덱스
pub struct DocumentSummaryIndex {
    index_id: String,
    storage: StorageContext,
    service: ServiceContext,
}

impl DocumentSummaryIndex {
    /// 노드로 새 인덱스 생성
    pub async fn build(
        index_id: &str,
        nodes: &[Node],
        storage: StorageContext,
        service: ServiceContext,
    ) -> Result<Self> {
        storage.docstore().add_index_struct(index_id, IndexKind::Summary)?;

        let index = Self {
            index_id: index_id.to_string(),
            storage,
            service,
        };
        index.insert_nodes(nodes).await?;

        tracing::info!("Built summary index {}", index_id);
        Ok(index)
    }

    /// 저장된 인덱스 열기
    pub fn load(index_id: &str, storage: StorageContext, service: ServiceContext) -> Result<Self> {
        match storage.docstore().get_index_kind(index_id)? {
            Some(IndexKind::Summary) => Ok(Self {
                index_id: index_id.to_string(),
                storage,
                service,
            }),
            Some(other) => anyhow::bail!(
                "Index {} is a {} index, not a summary index",
                index_id,
                other.as_str()
            ),
            None => anyhow::bail!("Summary index {} not found in storage", index_id),
        }
    }

    /// 저장된 (문서 ID, 요약) 목록
    pub fn summaries(&self) -> Result<Vec<(String, String)>> {
        self.storage.docstore().summaries(&self.index_id)
    }

    pub fn as_query_engine(&self) -> SummaryQueryEngine {
        SummaryQueryEngine {
            index_id: self.index_id.clone(),
            storage: self.storage.clone(),
            service: self.service.clone(),
        }
    }

    async fn summarize(&self, ref_doc_id: &str, nodes: &[Node]) -> Result<String> {
        let texts: Vec<String> = nodes.iter().map(Node::content_with_metadata).collect();
        let summary = self
            .service
            .synthesizer(ResponseMode::TreeSummarize)
            .get_response(SUMMARY_QUERY, &texts)
            .await?;

        tracing::info!("> Generated summary for doc {}", ref_doc_id);
        tracing::debug!("{}", summary);
        Ok(summary)
    }
}

#[async_trait]
impl BaseIndex for DocumentSummaryIndex {
    fn index_id(&self) -> &str {
        &self.index_id
    }

    fn storage(&self) -> &StorageContext {
        &self.storage
    }

    fn service(&self) -> &ServiceContext {
        &self.service
    }

    async fn insert_nodes(&self, nodes: &[Node]) -> Result<()> {
        if nodes.is_empty() {
            return Ok(());
        }

        let docstore = self.storage.docstore();
        docstore.add_nodes(nodes)?;

        let groups = group_by_ref_doc(nodes);
        let concurrency = self.service.settings().retrieval.concurrency.max(1);

        let futures: Vec<_> = groups
            .iter()
            .map(|(ref_doc_id, doc_nodes)| async move {
                let summary = self.summarize(ref_doc_id, doc_nodes).await?;
                Ok::<_, anyhow::Error>((ref_doc_id.clone(), summary))
            })
            .collect();
        let summaries: Vec<(String, String)> = stream::iter(futures)
            .buffered(concurrency)
            .try_collect()
            .await?;

        for ((ref_doc_id, doc_nodes), (_, summary)) in groups.iter().zip(summaries) {
            let node_ids: Vec<String> = doc_nodes.iter().map(|n| n.node_id.clone()).collect();
            docstore.add_index_nodes(&self.index_id, &node_ids)?;
            docstore.set_summary(&self.index_id, ref_doc_id, &summary)?;
        }

        tracing::info!("Summary index {}: {} documents added", self.index_id, groups.len());
        Ok(())
    }

    async fn delete_ref_doc(&self, ref_doc_id: &str) -> Result<()> {
        self.storage.docstore().delete_ref_doc(&self.index_id, ref_doc_id)?;
        Ok(())
    }
}

/// 노드를 문서별로 묶음 (처음 등장한 순서 유지)
fn group_by_ref_doc(nodes: &[Node]) -> Vec<(String, Vec<Node>)> {
    let mut groups: Vec<(String, Vec<Node>)> = Vec::new();
    let mut positions: BTreeMap<&str, usize> = BTreeMap::new();

    for node in nodes {
        match positions.get(node.ref_doc_id.as_str()) {
            Some(&pos) => groups[pos].1.push(node.clone()),
            None => {
                positions.insert(node.ref_doc_id.as_str(), groups.len());
                groups.push((node.ref_doc_id.clone(), vec![node.clone()]));
            }
        }
    }

    groups
}

// ============================================================================
// Query Engine
// ============================================================================

/// 요약 인덱스 질의 엔진
pub struct SummaryQueryEngine {
    index_id: String,
    storage: StorageContext,
    service: ServiceContext,
}

impl SummaryQueryEngine {
    /// LLM choice select로 관련 문서의 노드를 고름
    pub async fn retrieve(&self, query: &str) -> Result<Vec<NodeWithScore>> {
        let docstore = self.storage.docstore();
        let summaries = docstore.summaries(&self.index_id)?;
        let batch_size = self.service.settings().retrieval.choice_batch_size.max(1);

        let mut results = Vec::new();
        for batch in summaries.chunks(batch_size) {
            let context = batch
                .iter()
                .enumerate()
                .map(|(i, (_, summary))| format!("Document {}:\n{}", i + 1, summary))
                .collect::<Vec<_>>()
                .join("\n\n");

            let vars = BTreeMap::from([("context_str", context), ("query_str", query.to_string())]);
            let prompt = self.service.templates().render(PromptKind::ChoiceSelect, &vars)?;
            let raw = self.service.llm().complete(&prompt).await?;

            for (number, relevance) in parse_choice_select_answer(&raw, batch.len()) {
                let ref_doc_id = &batch[number - 1].0;
                tracing::debug!("Selected doc {} (relevance {})", ref_doc_id, relevance);

                for node in docstore.index_nodes_for_ref_doc(&self.index_id, ref_doc_id)? {
                    results.push(NodeWithScore::new(node, Some(relevance)));
                }
            }
        }

        Ok(results)
    }
}

#[async_trait]
impl QueryEngine for SummaryQueryEngine {
    async fn query(&self, query: &str) -> Result<Response> {
        let nodes = self.retrieve(query).await?;
        if nodes.is_empty() {
            tracing::info!("No relevant documents selected for query");
            return Ok(Response {
                response: EMPTY_RESPONSE.to_string(),
                ..Default::default()
            });
        }

        self.service
            .synthesizer(ResponseMode::TreeSummarize)
            .synthesize(query, nodes)
            .await
    }
}

/// `Doc: n, Relevance: r` 줄을 파싱
///
/// 범위를 벗어난 번호와 중복 번호는 무시합니다. 번호는 1부터 시작합니다.
pub fn parse_choice_select_answer(answer: &str, num_choices: usize) -> Vec<(usize, f32)> {
    let mut seen = Vec::new();
    let mut choices = Vec::new();

    let Ok(re) = Regex::new(CHOICE_LINE) else {
        return choices;
    };

    for caps in re.captures_iter(answer) {
        let (Ok(number), Ok(relevance)) = (caps[1].parse::<usize>(), caps[2].parse::<f32>()) else {
            continue;
        };

        if number == 0 || number > num_choices || seen.contains(&number) {
            tracing::debug!("Ignoring choice {} (of {})", number, num_choices);
            continue;
        }

        seen.push(number);
        choices.push((number, relevance));
    }

    choices
}

// ============================================================================
// Tests
// ============================================================================
