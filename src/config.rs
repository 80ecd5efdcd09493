//! 설정 모듈
//!
//! 데이터 경로와 모델 파라미터를 한곳에 모읍니다.
//! 기본값은 작업 디렉토리 기준 `data/` 레이아웃이며, 환경변수로 일부를 덮어쓸 수 있습니다.
//!
//! ```text
//! data/
//! ├── documents/          # -u files 입력 문서
//! ├── rss_urls.json       # RSS 피드 목록 (읽기 전용)
//! ├── article_urls.json   # 스테이징 URL
//! └── indexes/
//!     ├── index/          # 인덱스 저장소 (docstore.db + vectors.lance)
//!     └── stored_urls.json
//! variables.txt           # <list_id>,<vector_id>
//! ```

use std::path::{Path, PathBuf};

/// 데이터 디렉토리 환경변수
pub const DATA_DIR_ENV: &str = "ROUTER_RAG_DATA_DIR";

/// LLM 모델 환경변수
pub const LLM_MODEL_ENV: &str = "ROUTER_RAG_LLM_MODEL";

/// 기본 LLM 모델
pub const DEFAULT_LLM_MODEL: &str = "gemini-2.0-flash";

// ============================================================================
// Paths
// ============================================================================

/// 파일 경로 모음
#[derive(Debug, Clone)]
pub struct Paths {
    /// 입력 문서 디렉토리
    pub documents_dir: PathBuf,
    /// 인덱스 저장 디렉토리
    pub index_dir: PathBuf,
    /// 스테이징 URL 문서
    pub article_urls: PathBuf,
    /// RSS 피드 목록
    pub rss_urls: PathBuf,
    /// 인덱싱 완료 URL 문서
    pub stored_urls: PathBuf,
    /// 인덱스 ID 파일
    pub variables_file: PathBuf,
}

impl Paths {
    /// 데이터 디렉토리 기준 경로 생성
    pub fn with_data_dir(data_dir: &Path) -> Self {
        let indexes = data_dir.join("indexes");
        Self {
            documents_dir: data_dir.join("documents"),
            index_dir: indexes.join("index"),
            article_urls: data_dir.join("article_urls.json"),
            rss_urls: data_dir.join("rss_urls.json"),
            stored_urls: indexes.join("stored_urls.json"),
            variables_file: PathBuf::from("variables.txt"),
        }
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::with_data_dir(Path::new("data"))
    }
}

// ============================================================================
// Model Settings
// ============================================================================

/// LLM 호출 설정
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_LLM_MODEL.to_string(),
            temperature: 1.0,
            max_output_tokens: 512,
        }
    }
}

/// 청킹 설정 (추정 토큰 단위)
#[derive(Debug, Clone)]
pub struct SplitterSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for SplitterSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            chunk_overlap: 20,
        }
    }
}

/// 프롬프트 크기 설정
#[derive(Debug, Clone)]
pub struct PromptSettings {
    /// LLM 컨텍스트 윈도우 (토큰)
    pub context_window: usize,
    /// 출력용 예약 토큰
    pub num_output: usize,
    /// 재패킹 시 청크 간 오버랩 비율
    pub chunk_overlap_ratio: f32,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            context_window: 3900,
            num_output: 256,
            chunk_overlap_ratio: 0.1,
        }
    }
}

/// 검색 설정
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    /// 벡터 검색 결과 수
    pub similarity_top_k: usize,
    /// 요약 선택 시 한 번에 LLM에 보내는 문서 수
    pub choice_batch_size: usize,
    /// 동시 LLM 호출 수
    pub concurrency: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            similarity_top_k: 3,
            choice_batch_size: 10,
            concurrency: 4,
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// 전체 설정
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub paths: Paths,
    pub llm: LlmSettings,
    pub splitter: SplitterSettings,
    pub prompt: PromptSettings,
    pub retrieval: RetrievalSettings,
}

impl Settings {
    /// 환경변수를 반영한 설정
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.is_empty() {
                tracing::debug!("Using data dir from {}: {}", DATA_DIR_ENV, dir);
                settings.paths = Paths::with_data_dir(Path::new(&dir));
            }
        }

        if let Ok(model) = std::env::var(LLM_MODEL_ENV) {
            if !model.is_empty() {
                settings.llm.model = model;
            }
        }

        settings
    }
}

// ============================================================================
// Tests
// ============================================================================
