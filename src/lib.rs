//! router-rag - RSS + 로컬 문서 기반 라우터 RAG 어시스턴트
//!
//! 로컬 문서와 RSS 기사를 요약 인덱스와 벡터 인덱스로 만들고,
//! 질의마다 LLM이 둘 중 알맞은 인덱스를 골라 답변을 합성합니다.

pub mod cli;
pub mod config;
pub mod context;
pub mod gemini;
pub mod knowledge;
pub mod loader;
pub mod pipeline;
pub mod urls;

#[cfg(test)]
mod testing;

// Re-exports
pub use config::{Paths, Settings};
pub use context::ServiceContext;
pub use gemini::{get_api_key, has_api_key, EmbeddingProvider, GeminiEmbedding, GeminiLlm, LlmProvider};
pub use knowledge::{
    DocumentSummaryIndex, IndexIds, QueryEngine, Response, RouterQueryEngine, StorageContext,
    VectorStoreIndex,
};
pub use loader::{ArticleLoader, DirectoryReader, RssReader, UrlLoader};
pub use urls::{get_unique_elements, remove_duplicate_elements, UrlCollection, UrlStoreError};
