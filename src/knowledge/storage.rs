//! Storage Context - 인덱스 디렉토리
//!
//! ```text
//! <index_dir>/
//! ├── docstore.db      # 노드, 해시, 인덱스 구조, 요약 (SQLite)
//! └── vectors.lance/   # 벡터 인덱스별 테이블 (LanceDB)
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::docstore::{DocStore, DOCSTORE_FILE};
use super::lance::{LanceVectorStore, LANCE_DIR};

/// 인덱스 저장소 묶음
#[derive(Clone)]
pub struct StorageContext {
    index_dir: PathBuf,
    docstore: DocStore,
}

impl StorageContext {
    /// 기존 인덱스 디렉토리 열기 (없으면 생성)
    pub fn open(index_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(index_dir)
            .with_context(|| format!("Failed to create index dir {}", index_dir.display()))?;

        let docstore = DocStore::open_in(index_dir)?;
        Ok(Self {
            index_dir: index_dir.to_path_buf(),
            docstore,
        })
    }

    /// 비어 있는 저장소로 새로 시작 (기존 docstore/벡터 삭제)
    pub fn create_fresh(index_dir: &Path) -> Result<Self> {
        let db_path = index_dir.join(DOCSTORE_FILE);
        if db_path.exists() {
            std::fs::remove_file(&db_path)
                .with_context(|| format!("Failed to remove {}", db_path.display()))?;
        }

        let lance_path = index_dir.join(LANCE_DIR);
        if lance_path.exists() {
            std::fs::remove_dir_all(&lance_path)
                .with_context(|| format!("Failed to remove {}", lance_path.display()))?;
        }

        tracing::info!("Creating fresh index storage at {:?}", index_dir);
        Self::open(index_dir)
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn docstore(&self) -> &DocStore {
        &self.docstore
    }

    /// 벡터 인덱스 테이블 열기
    pub async fn vector_store(&self, index_id: &str, dimension: usize) -> Result<LanceVectorStore> {
        LanceVectorStore::open_in(&self.index_dir, index_id, dimension).await
    }
}
