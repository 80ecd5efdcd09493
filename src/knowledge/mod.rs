//! Knowledge 모듈 - 라우터 RAG 인덱스
//!
//! - DocStore (SQLite): 노드, 문서 해시, 인덱스 구조, 문서 요약
//! - LanceDB: 벡터 인덱스별 임베딩 테이블
//! - DocumentSummaryIndex: 문서 요약 + LLM choice select
//! - VectorStoreIndex: 임베딩 top-k 검색
//! - RouterQueryEngine: LLM이 두 인덱스 중 하나를 선택

mod chunker;
mod docstore;
mod document;
mod ids;
mod index;
mod lance;
mod prompts;
mod router;
mod storage;
mod summary_index;
mod synthesizer;
mod vector;
mod vector_index;

// Re-exports
pub use chunker::{estimate_tokens, Chunker, NodeParser, TextChunk, TokenTextSplitter};
pub use docstore::{DocStore, DocStoreStats, IndexKind, DOCSTORE_FILE};
pub use document::{meta, Document, Metadata, Node, NodeWithScore, Response};
pub use ids::IndexIds;
pub use index::{BaseIndex, QueryEngine};
pub use lance::{LanceVectorStore, LANCE_DIR};
pub use prompts::{PromptHelper, PromptKind, PromptTemplates, SUMMARY_QUERY};
pub use router::{
    parse_selection, LlmSingleSelector, QueryEngineTool, RouterQueryEngine, SingleSelection,
    SELECTED_TOOL_KEY, SELECTOR_REASON_KEY, SUMMARY_TOOL_DESCRIPTION, VECTOR_TOOL_DESCRIPTION,
};
pub use storage::StorageContext;
pub use summary_index::{parse_choice_select_answer, DocumentSummaryIndex, SummaryQueryEngine};
pub use synthesizer::{ResponseMode, ResponseSynthesizer, EMPTY_RESPONSE};
pub use vector::{cosine_similarity, SearchResult, VectorEntry, VectorStore};
pub use vector_index::{VectorQueryEngine, VectorStoreIndex};
