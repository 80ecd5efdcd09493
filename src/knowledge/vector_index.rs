//! Vector Store Index
//!
//! 노드 임베딩을 LanceDB 테이블(인덱스 ID)에 저장하고,
//! 질의 임베딩과의 코사인 유사도 상위 k개 노드로 compact 답변을 만듭니다.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::context::ServiceContext;
use crate::gemini::EmbedTask;

use super::docstore::IndexKind;
use super::document::{Node, NodeWithScore, Response};
use super::index::{BaseIndex, QueryEngine};
use super::lance::LanceVectorStore;
use super::storage::StorageContext;
use super::synthesizer::{ResponseMode, EMPTY_RESPONSE};
use super::vector::{VectorEntry, VectorStore};

// ============================================================================
// VectorStoreIndex
// ============================================================================

/// 벡터 인덱스
pub struct VectorStoreIndex {
    index_id: String,
    storage: StorageContext,
    service: ServiceContext,
    vector_store: Arc<dyn VectorStore>,
}

impl VectorStoreIndex {
    /// 노드로 새 인덱스 생성
    pub async fn build(
        index_id: &str,
        nodes: &[Node],
        storage: StorageContext,
        service: ServiceContext,
    ) -> Result<Self> {
        storage.docstore().add_index_struct(index_id, IndexKind::Vector)?;

        let index = Self::open(index_id, storage, service).await?;
        index.insert_nodes(nodes).await?;

        tracing::info!("Built vector index {}", index_id);
        Ok(index)
    }

    /// 저장된 인덱스 열기
    pub async fn load(index_id: &str, storage: StorageContext, service: ServiceContext) -> Result<Self> {
        match storage.docstore().get_index_kind(index_id)? {
            Some(IndexKind::Vector) => Self::open(index_id, storage, service).await,
            Some(other) => anyhow::bail!(
                "Index {} is a {} index, not a vector index",
                index_id,
                other.as_str()
            ),
            None => anyhow::bail!("Vector index {} not found in storage", index_id),
        }
    }

    async fn open(index_id: &str, storage: StorageContext, service: ServiceContext) -> Result<Self> {
        let dimension = service.embed_model().dimension();
        let store: LanceVectorStore = storage.vector_store(index_id, dimension).await?;

        Ok(Self {
            index_id: index_id.to_string(),
            storage,
            service,
            vector_store: Arc::new(store),
        })
    }

    /// 저장된 벡터 수
    pub async fn vector_count(&self) -> Result<usize> {
        self.vector_store.count().await
    }

    pub fn as_query_engine(&self, similarity_top_k: usize) -> VectorQueryEngine {
        VectorQueryEngine {
            storage: self.storage.clone(),
            service: self.service.clone(),
            vector_store: self.vector_store.clone(),
            similarity_top_k,
        }
    }
}

#[async_trait]
impl BaseIndex for VectorStoreIndex {
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

        let texts: Vec<String> = nodes.iter().map(Node::content_with_metadata).collect();
        tracing::info!("Generating embeddings for {} nodes", texts.len());

        let embeddings = self
            .service
            .embed_model()
            .embed_batch(&texts, EmbedTask::Document)
            .await?;

        let entries: Vec<VectorEntry> = nodes
            .iter()
            .zip(embeddings)
            .map(|(node, embedding)| VectorEntry {
                node_id: node.node_id.clone(),
                ref_doc_id: node.ref_doc_id.clone(),
                embedding,
            })
            .collect();

        let inserted = self.vector_store.insert_batch(&entries).await?;

        let node_ids: Vec<String> = nodes.iter().map(|n| n.node_id.clone()).collect();
        docstore.add_index_nodes(&self.index_id, &node_ids)?;

        tracing::info!("Vector index {}: {} vectors added", self.index_id, inserted);
        Ok(())
    }

    async fn delete_ref_doc(&self, ref_doc_id: &str) -> Result<()> {
        let removed = self.vector_store.delete_by_ref_doc(ref_doc_id).await?;
        self.storage.docstore().delete_ref_doc(&self.index_id, ref_doc_id)?;
        tracing::debug!("Removed {} vectors for {}", removed, ref_doc_id);
        Ok(())
    }
}

// ============================================================================
// Query Engine
// ============================================================================

/// 벡터 인덱스 질의 엔진
pub struct VectorQueryEngine {
    storage: StorageContext,
    service: ServiceContext,
    vector_store: Arc<dyn VectorStore>,
    similarity_top_k: usize,
}

impl VectorQueryEngine {
    /// 질의와 유사한 노드 검색 (유사도 내림차순)
    pub async fn retrieve(&self, query: &str) -> Result<Vec<NodeWithScore>> {
        let embedding = self
            .service
            .embed_model()
            .embed(query, EmbedTask::Query)
            .await?;

        let results = self
            .vector_store
            .search(&embedding, self.similarity_top_k)
            .await?;

        let scores: HashMap<String, f32> = results
            .iter()
            .map(|r| (r.node_id.clone(), r.similarity))
            .collect();
        let node_ids: Vec<String> = results.into_iter().map(|r| r.node_id).collect();

        let nodes = self.storage.docstore().get_nodes(&node_ids)?;
        Ok(nodes
            .into_iter()
            .map(|node| {
                let score = scores.get(&node.node_id).copied();
                NodeWithScore::new(node, score)
            })
            .collect())
    }
}

#[async_trait]
impl QueryEngine for VectorQueryEngine {
    async fn query(&self, query: &str) -> Result<Response> {
        let nodes = self.retrieve(query).await?;
        if nodes.is_empty() {
            return Ok(Response {
                response: EMPTY_RESPONSE.to_string(),
                ..Default::default()
            });
        }

        self.service
            .synthesizer(ResponseMode::Compact)
            .synthesize(query, nodes)
            .await
    }
}

// ============================================================================
// Tests
// ============================================================================
