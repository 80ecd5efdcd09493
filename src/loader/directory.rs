//! 문서 폴더 로더
//!
//! 폴더를 재귀로 훑어 지원하는 파일을 `Document`로 읽습니다.
//! 파일 경로가 곧 문서 ID이며, PDF는 페이지마다 `<path>#page=<n>` 문서가 됩니다.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;

use super::pdf;
use crate::knowledge::{meta, Document};

// ============================================================================
// File Types
// ============================================================================

/// 지원하는 파일 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// 텍스트 파일 (마크다운, 코드 등)
    Text,
    /// PDF 파일
    Pdf,
}

impl FileType {
    /// 확장자로 파일 타입 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_lowercase();
        match ext.as_str() {
            "md" | "txt" | "rst" | "rs" | "ts" | "tsx" | "js" | "jsx" | "py" | "json" | "toml"
            | "yaml" | "yml" | "html" | "htm" | "css" | "go" | "java" | "c" | "cpp" | "h"
            | "hpp" | "sh" | "sql" | "xml" | "csv" => Some(FileType::Text),

            "pdf" => Some(FileType::Pdf),

            _ => None,
        }
    }

    /// 파일 경로에서 타입 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

// ============================================================================
// DirectoryReader
// ============================================================================

/// 로더 설정
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// .gitignore 패턴 존중 여부
    pub respect_gitignore: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// 문서 폴더 로더
pub struct DirectoryReader {
    input_dir: PathBuf,
    config: ReaderConfig,
}

impl DirectoryReader {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self::with_config(input_dir, ReaderConfig::default())
    }

    pub fn with_config(input_dir: impl Into<PathBuf>, config: ReaderConfig) -> Self {
        Self {
            input_dir: input_dir.into(),
            config,
        }
    }

    /// 지원하는 파일 목록 (경로 순)
    pub fn collect_files(&self) -> Result<Vec<(PathBuf, FileType)>> {
        if !self.input_dir.is_dir() {
            anyhow::bail!("Directory not found: {:?}", self.input_dir);
        }

        let walker = WalkBuilder::new(&self.input_dir)
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .sort_by_file_path(|a, b| a.cmp(b))
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            let path = entry.path().to_path_buf();
            let Some(file_type) = FileType::from_path(&path) else {
                tracing::debug!("Skipping unsupported file: {:?}", path);
                continue;
            };

            if self.config.max_file_size > 0 {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                if size > self.config.max_file_size {
                    tracing::debug!("Skipping large file: {:?} ({} bytes)", path, size);
                    continue;
                }
            }

            files.push((path, file_type));
        }

        Ok(files)
    }

    /// 폴더의 모든 문서 읽기
    pub async fn load_data(&self) -> Result<Vec<Document>> {
        let files = self.collect_files()?;
        if files.is_empty() {
            anyhow::bail!("No files found in {:?}", self.input_dir);
        }

        let mut documents = Vec::new();
        for (path, file_type) in files {
            match file_type {
                FileType::Text => documents.push(read_text_file(&path).await?),
                FileType::Pdf => documents.extend(read_pdf_file(&path).await?),
            }
        }

        tracing::info!("Loaded {} documents from {:?}", documents.len(), self.input_dir);
        Ok(documents)
    }
}

fn base_document(path: &Path, doc_id: String, text: String) -> Document {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Document::new(doc_id, text)
        .with_meta(meta::FILE_NAME, file_name)
        .with_meta(meta::FILE_PATH, path.display().to_string())
}

async fn read_text_file(path: &Path) -> Result<Document> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read text file: {:?}", path))?;
    let text = String::from_utf8_lossy(&bytes).to_string();

    Ok(base_document(path, path.display().to_string(), text))
}

async fn read_pdf_file(path: &Path) -> Result<Vec<Document>> {
    // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
    let owned = path.to_path_buf();
    let pages = tokio::task::spawn_blocking(move || pdf::extract_text_from_pdf(&owned))
        .await
        .context("PDF extraction task failed")??;

    Ok(pages
        .into_iter()
        .map(|(page, text)| {
            let doc_id = format!("{}#page={}", path.display(), page);
            base_document(path, doc_id, text).with_meta(meta::PAGE_LABEL, page.to_string())
        })
        .collect())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_type_from_extension() {
        assert_eq!(FileType::from_extension("md"), Some(FileType::Text));
        assert_eq!(FileType::from_extension("TXT"), Some(FileType::Text));
        assert_eq!(FileType::from_extension("PDF"), Some(FileType::Pdf));
        assert_eq!(FileType::from_extension("png"), None);
        assert_eq!(FileType::from_extension("exe"), None);
    }

    #[tokio::test]
    async fn test_load_text_documents() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("b.md"), "# B\nsecond").unwrap();
        std::fs::write(dir.path().join("a.txt"), "first").unwrap();
        std::fs::write(dir.path().join("sub").join("c.md"), "nested").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let docs = DirectoryReader::new(dir.path()).load_data().await.unwrap();
        assert_eq!(docs.len(), 3);

        let a = &docs[0];
        assert_eq!(a.text, "first");
        assert_eq!(a.doc_id, dir.path().join("a.txt").display().to_string());
        assert_eq!(a.metadata.get(meta::FILE_NAME).map(String::as_str), Some("a.txt"));
        assert_eq!(
            a.metadata.get(meta::FILE_PATH),
            Some(&dir.path().join("a.txt").display().to_string())
        );

        assert!(docs.iter().any(|d| d.text == "nested"));
    }

    #[tokio::test]
    async fn test_missing_or_empty_directory_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(DirectoryReader::new(dir.path().join("missing")).load_data().await.is_err());
        assert!(DirectoryReader::new(dir.path()).load_data().await.is_err());
    }

    #[test]
    fn test_max_file_size() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("big.txt"), "x".repeat(64)).unwrap();
        std::fs::write(dir.path().join("small.txt"), "x").unwrap();

        let reader = DirectoryReader::with_config(
            dir.path(),
            ReaderConfig {
                max_file_size: 10,
                ..Default::default()
            },
        );
        let files = reader.collect_files().unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].0.ends_with("small.txt"));
    }
}
