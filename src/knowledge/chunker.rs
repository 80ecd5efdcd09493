//! Text Chunking Module
//!
//! 추정 토큰 수 기준으로 텍스트를 분할합니다.
//! 분할은 구분자 우선순위(공백 → 문단 → 줄 → `。` → `、` → 문자)를 따르고,
//! 각 청크는 원문 내 문자 오프셋을 유지합니다.

use uuid::Uuid;

use crate::config::SplitterSettings;

use super::document::{Document, Node};

/// 기본 구분자 (우선순위 순)
pub const DEFAULT_SEPARATORS: &[&str] = &[" ", "\n\n", "\n", "。", "、"];

// ============================================================================
// Token Estimation
// ============================================================================

/// 토큰 수 추정
///
/// ASCII 4자당 1토큰, 비ASCII 문자(한글, 한자, 가나 등)는 1자당 1토큰으로 계산합니다.
pub fn estimate_tokens(text: &str) -> usize {
    let (ascii, other) = count_chars(text);
    tokens_of(ascii, other)
}

#[inline]
fn tokens_of(ascii: usize, other: usize) -> usize {
    ascii.div_ceil(4) + other
}

#[inline]
fn count_chars(text: &str) -> (usize, usize) {
    text.chars().fold((0, 0), |(ascii, other), c| {
        if c.is_ascii() {
            (ascii + 1, other)
        } else {
            (ascii, other + 1)
        }
    })
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 오프셋을 가진 청크
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub text: String,
    /// 시작 문자 위치 (포함)
    pub start_char_idx: usize,
    /// 끝 문자 위치 (제외)
    pub end_char_idx: usize,
}

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn split(&self, text: &str) -> Vec<TextChunk>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// TokenTextSplitter
// ============================================================================

/// 토큰 예산 기반 분할기
pub struct TokenTextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TokenTextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn from_settings(settings: &SplitterSettings) -> Self {
        Self::new(settings.chunk_size, settings.chunk_overlap)
    }

    /// 범위를 chunk_size 이하의 연속 조각으로 분해 (바이트 범위)
    fn split_spans(&self, text: &str, start: usize, end: usize, level: usize, out: &mut Vec<(usize, usize)>) {
        let piece = &text[start..end];
        if estimate_tokens(piece) <= self.chunk_size {
            out.push((start, end));
            return;
        }

        let Some(separator) = self.separators.get(level) else {
            self.split_chars(text, start, end, out);
            return;
        };

        let parts = split_keep_separator(piece, separator);
        if parts.len() <= 1 {
            self.split_spans(text, start, end, level + 1, out);
            return;
        }

        for (s, e) in parts {
            self.split_spans(text, start + s, start + e, level + 1, out);
        }
    }

    /// 구분자로 더 나눌 수 없을 때 문자 단위로 자름
    fn split_chars(&self, text: &str, start: usize, end: usize, out: &mut Vec<(usize, usize)>) {
        let mut chunk_start = start;
        let (mut ascii, mut other) = (0usize, 0usize);

        for (offset, c) in text[start..end].char_indices() {
            let (next_ascii, next_other) = if c.is_ascii() {
                (ascii + 1, other)
            } else {
                (ascii, other + 1)
            };

            if tokens_of(next_ascii, next_other) > self.chunk_size && start + offset > chunk_start {
                out.push((chunk_start, start + offset));
                chunk_start = start + offset;
                (ascii, other) = if c.is_ascii() { (1, 0) } else { (0, 1) };
            } else {
                (ascii, other) = (next_ascii, next_other);
            }
        }

        if chunk_start < end {
            out.push((chunk_start, end));
        }
    }

    /// 조각을 chunk_size까지 병합하고 chunk_overlap만큼 겹치게 함
    fn merge_spans(&self, text: &str, spans: &[(usize, usize)]) -> Vec<(usize, usize)> {
        // 조각별 (ascii, other) 누적합
        let mut prefix = Vec::with_capacity(spans.len() + 1);
        prefix.push((0usize, 0usize));
        for &(s, e) in spans {
            let (a, o) = count_chars(&text[s..e]);
            let (pa, po) = prefix[prefix.len() - 1];
            prefix.push((pa + a, po + o));
        }
        let range_tokens = |from: usize, to: usize| {
            tokens_of(prefix[to].0 - prefix[from].0, prefix[to].1 - prefix[from].1)
        };

        let mut merged = Vec::new();
        let mut i = 0;

        while i < spans.len() {
            let mut j = i;
            while j + 1 < spans.len() && range_tokens(i, j + 2) <= self.chunk_size {
                j += 1;
            }
            merged.push((spans[i].0, spans[j].1));

            if j + 1 >= spans.len() {
                break;
            }

            // 다음 청크는 이전 청크 끝부분 overlap 토큰만큼 되돌아가서 시작
            let mut k = j + 1;
            while k > i + 1
                && range_tokens(k - 1, j + 1) <= self.chunk_overlap
                && range_tokens(k - 1, j + 2) <= self.chunk_size
            {
                k -= 1;
            }
            i = k;
        }

        merged
    }
}

impl Chunker for TokenTextSplitter {
    fn split(&self, text: &str) -> Vec<TextChunk> {
        if text.trim().is_empty() {
            return vec![];
        }

        let mut spans = Vec::new();
        self.split_spans(text, 0, text.len(), 0, &mut spans);
        let merged = self.merge_spans(text, &spans);

        let mut start_cursor = CharCursor::default();
        let mut end_cursor = CharCursor::default();
        let mut chunks = Vec::with_capacity(merged.len());

        for (s, e) in merged {
            let raw = &text[s..e];
            let trimmed_start = s + (raw.len() - raw.trim_start().len());
            let trimmed_end = e - (raw.len() - raw.trim_end().len());
            if trimmed_start >= trimmed_end {
                continue;
            }

            chunks.push(TextChunk {
                text: text[trimmed_start..trimmed_end].to_string(),
                start_char_idx: start_cursor.char_index(text, trimmed_start),
                end_char_idx: end_cursor.char_index(text, trimmed_end),
            });
        }

        chunks
    }

    fn name(&self) -> &'static str {
        "TokenTextSplitter"
    }
}

/// 구분자를 앞 조각 끝에 붙여서 분할 (상대 바이트 범위)
fn split_keep_separator(piece: &str, separator: &str) -> Vec<(usize, usize)> {
    let mut parts = Vec::new();
    let mut last = 0;

    for (idx, matched) in piece.match_indices(separator) {
        let end = idx + matched.len();
        if end > last {
            parts.push((last, end));
        }
        last = end;
    }

    if last < piece.len() {
        parts.push((last, piece.len()));
    }

    parts
}

/// 단조 증가하는 바이트 위치 → 문자 위치 변환
#[derive(Default)]
struct CharCursor {
    byte: usize,
    chars: usize,
}

impl CharCursor {
    fn char_index(&mut self, text: &str, byte: usize) -> usize {
        if byte < self.byte {
            self.byte = 0;
            self.chars = 0;
        }
        self.chars += text[self.byte..byte].chars().count();
        self.byte = byte;
        self.chars
    }
}

// ============================================================================
// NodeParser
// ============================================================================

/// 문서 → 노드 변환기
pub struct NodeParser {
    chunker: Box<dyn Chunker>,
}

impl NodeParser {
    pub fn new(chunker: Box<dyn Chunker>) -> Self {
        Self { chunker }
    }

    pub fn from_settings(settings: &SplitterSettings) -> Self {
        Self::new(Box::new(TokenTextSplitter::from_settings(settings)))
    }

    /// 문서들을 청크 노드로 분할 (문서 메타데이터 상속)
    pub fn get_nodes_from_documents(&self, documents: &[Document]) -> Vec<Node> {
        let mut nodes = Vec::new();

        for doc in documents {
            let chunks = self.chunker.split(&doc.text);
            if chunks.is_empty() {
                tracing::warn!("No chunks generated for document: {}", doc.doc_id);
                continue;
            }

            tracing::debug!(
                "Split {} into {} chunks ({})",
                doc.doc_id,
                chunks.len(),
                self.chunker.name()
            );

            nodes.extend(chunks.into_iter().map(|chunk| Node {
                node_id: Uuid::new_v4().to_string(),
                ref_doc_id: doc.doc_id.clone(),
                text: chunk.text,
                start_char_idx: Some(chunk.start_char_idx),
                end_char_idx: Some(chunk.end_char_idx),
                metadata: doc.metadata.clone(),
            }));
        }

        nodes
    }
}

// ============================================================================
// Tests
// ============================================================================
