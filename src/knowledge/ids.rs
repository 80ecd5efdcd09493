//! 인덱스 ID 쌍 (`variables.txt`)
//!
//! 요약 인덱스 ID와 벡터 인덱스 ID를 `<list_id>,<vector_id>` 한 줄로 저장합니다.
//! 빌드할 때마다 새 ID가 발급되고, 질의/갱신은 저장된 ID로 인덱스를 엽니다.

use std::path::Path;

use anyhow::{Context, Result};
use uuid::Uuid;

/// 영속화된 인덱스 ID 쌍
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexIds {
    /// 요약 인덱스 ID
    pub list_id: String,
    /// 벡터 인덱스 ID (LanceDB 테이블 이름)
    pub vector_id: String,
}

impl IndexIds {
    pub fn new(list_id: impl Into<String>, vector_id: impl Into<String>) -> Self {
        Self {
            list_id: list_id.into(),
            vector_id: vector_id.into(),
        }
    }

    /// 새 ID 쌍 발급
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string(), Uuid::new_v4().to_string())
    }

    /// 파일에서 ID 쌍 읽기 (파일이 없으면 None)
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            tracing::info!("No index id file at {:?}; it will be created by a build", path);
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let ids = Self::parse(&content)
            .with_context(|| format!("Invalid index id file {}", path.display()))?;

        tracing::debug!("Loaded index ids: {},{}", ids.list_id, ids.vector_id);
        Ok(Some(ids))
    }

    /// ID 쌍 저장 (덮어쓰기)
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(path, self.to_line())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    fn parse(content: &str) -> Result<Self> {
        let mut parts = content.trim().split(',');
        let list_id = parts.next().map(str::trim).unwrap_or_default();
        let vector_id = parts.next().map(str::trim).unwrap_or_default();

        if list_id.is_empty() || vector_id.is_empty() {
            anyhow::bail!("expected `<list_id>,<vector_id>`, got {:?}", content.trim());
        }

        Ok(Self::new(list_id, vector_id))
    }

    fn to_line(&self) -> String {
        format!("{},{}", self.list_id, self.vector_id)
    }
}

// ============================================================================
// Tests
// ============================================================================
