//! 인덱스 공통 트레이트
//!
//! 요약 인덱스와 벡터 인덱스는 같은 docstore를 공유하고, 문서 해시는 인덱스별로 관리합니다.

use anyhow::Result;
use async_trait::async_trait;

use crate::context::ServiceContext;

use super::document::{Document, Node, Response};
use super::storage::StorageContext;

/// 질의 엔진
#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn query(&self, query: &str) -> Result<Response>;
}

/// 인덱스 공통 동작
#[async_trait]
pub trait BaseIndex: Send + Sync {
    fn index_id(&self) -> &str;

    fn storage(&self) -> &StorageContext;

    fn service(&self) -> &ServiceContext;

    /// 노드를 인덱스에 추가 (docstore에도 저장)
    async fn insert_nodes(&self, nodes: &[Node]) -> Result<()>;

    /// 문서를 인덱스에서 제거
    async fn delete_ref_doc(&self, ref_doc_id: &str) -> Result<()>;

    /// 문서 하나를 분할해서 추가
    async fn insert_document(&self, document: &Document) -> Result<()> {
        let nodes = self
            .service()
            .node_parser()
            .get_nodes_from_documents(std::slice::from_ref(document));
        self.insert_nodes(&nodes).await
    }

    /// 문서 변경 감지 후 갱신
    ///
    /// 문서별로 새로 추가되거나 갱신되었으면 `true`를 돌려줍니다.
    /// 해시가 없지만 이미 인덱스에 노드가 있는 문서(직전 빌드)는 해시만 기록합니다.
    async fn refresh_ref_docs(&self, documents: &[Document]) -> Result<Vec<bool>> {
        let docstore = self.storage().docstore();
        let index_id = self.index_id();
        let mut refreshed = Vec::with_capacity(documents.len());

        for document in documents {
            let hash = document.hash();
            let existing = docstore.get_document_hash(index_id, &document.doc_id)?;

            let changed = match existing {
                Some(previous) if previous == hash => false,
                Some(_) => {
                    tracing::info!("Document changed, re-indexing: {}", document.doc_id);
                    self.delete_ref_doc(&document.doc_id).await?;
                    self.insert_document(document).await?;
                    true
                }
                None => {
                    let indexed = docstore.index_nodes_for_ref_doc(index_id, &document.doc_id)?;
                    if indexed.is_empty() {
                        tracing::info!("New document, indexing: {}", document.doc_id);
                        self.insert_document(document).await?;
                        true
                    } else {
                        false
                    }
                }
            };

            docstore.set_document_hash(index_id, &document.doc_id, &hash)?;
            refreshed.push(changed);
        }

        Ok(refreshed)
    }
}
