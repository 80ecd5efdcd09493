//! 문서 / 노드 타입
//!
//! - `Document`: 로더가 만든 원문 (파일, PDF 페이지, 웹 기사, 피드 항목)
//! - `Node`: 문서를 분할한 청크 (원문 내 문자 오프셋 포함)
//! - `NodeWithScore`: 검색 결과

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// 메타데이터 (키 순서 고정)
pub type Metadata = BTreeMap<String, String>;

/// 메타데이터 키
pub mod meta {
    pub const FILE_NAME: &str = "file_name";
    pub const FILE_PATH: &str = "file_path";
    pub const PAGE_LABEL: &str = "page_label";
    pub const URL: &str = "URL";
    pub const LINK: &str = "link";
    pub const TITLE: &str = "title";
}

// ============================================================================
// Document
// ============================================================================

/// 원문 문서
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub text: String,
    pub metadata: Metadata,
}

impl Document {
    pub fn new(doc_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    /// 메타데이터 추가 (빌더)
    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// 변경 감지용 해시 (텍스트 + 메타데이터)
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        for (key, value) in &self.metadata {
            hasher.update([0u8]);
            hasher.update(key.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// Node
// ============================================================================

/// 문서 청크
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub node_id: String,
    pub ref_doc_id: String,
    pub text: String,
    /// 원문 내 시작 문자 위치 (포함)
    pub start_char_idx: Option<usize>,
    /// 원문 내 끝 문자 위치 (제외)
    pub end_char_idx: Option<usize>,
    pub metadata: Metadata,
}

impl Node {
    /// LLM 프롬프트에 넣을 텍스트 (메타데이터 포함)
    pub fn content_with_metadata(&self) -> String {
        let header: Vec<String> = self
            .metadata
            .iter()
            .filter(|(key, _)| key.as_str() != meta::FILE_PATH)
            .map(|(key, value)| format!("{}: {}", key, value))
            .collect();

        if header.is_empty() {
            self.text.clone()
        } else {
            format!("{}\n\n{}", header.join("\n"), self.text)
        }
    }
}

/// 점수가 붙은 노드
#[derive(Debug, Clone, PartialEq)]
pub struct NodeWithScore {
    pub node: Node,
    pub score: Option<f32>,
}

impl NodeWithScore {
    pub fn new(node: Node, score: Option<f32>) -> Self {
        Self { node, score }
    }
}

// ============================================================================
// Response
// ============================================================================

/// 질의 응답
#[derive(Debug, Clone, Default)]
pub struct Response {
    /// 답변 텍스트
    pub response: String,
    /// 답변에 사용된 노드
    pub source_nodes: Vec<NodeWithScore>,
    /// 부가 정보 (선택된 인덱스, 선택 이유 등)
    pub metadata: Metadata,
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.response)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_changes_with_text_and_metadata() {
        let a = Document::new("a.md", "hello");
        let b = Document::new("a.md", "hello!");
        let c = Document::new("a.md", "hello").with_meta(meta::FILE_NAME, "a.md");

        assert_eq!(a.hash(), Document::new("other-id", "hello").hash());
        assert_ne!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn test_content_with_metadata() {
        let node = Node {
            node_id: "n1".to_string(),
            ref_doc_id: "d1".to_string(),
            text: "body".to_string(),
            start_char_idx: Some(0),
            end_char_idx: Some(4),
            metadata: Metadata::from([
                (meta::FILE_NAME.to_string(), "a.md".to_string()),
                (meta::FILE_PATH.to_string(), "/tmp/a.md".to_string()),
            ]),
        };

        assert_eq!(node.content_with_metadata(), "file_name: a.md\n\nbody");
    }
}
