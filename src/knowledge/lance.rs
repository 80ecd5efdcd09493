//! LanceDB Vector Store - 벡터 인덱스 저장소
//!
//! 벡터 인덱스 ID가 곧 테이블 이름입니다. 저장 위치: `<index_dir>/vectors.lance`
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;

use super::vector::{cosine_similarity, sql_literal, SearchResult, VectorEntry, VectorStore};

/// LanceDB 디렉토리 이름
pub const LANCE_DIR: &str = "vectors.lance";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 (테이블 하나)
pub struct LanceVectorStore {
    db: Connection,
    table_name: String,
    dimension: usize,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `table_name` - 테이블 이름 (벡터 인덱스 ID)
    /// * `dimension` - 임베딩 차원
    pub async fn open(path: &Path, table_name: &str, dimension: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self {
            db,
            table_name: table_name.to_string(),
            dimension,
        })
    }

    /// 인덱스 디렉토리 안의 LanceDB 열기
    pub async fn open_in(index_dir: &Path, table_name: &str, dimension: usize) -> Result<Self> {
        Self::open(&index_dir.join(LANCE_DIR), table_name, dimension).await
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// 벡터 테이블 스키마
    fn create_schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("node_id", DataType::Utf8, false),
            Field::new("ref_doc_id", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(&self, entries: &[VectorEntry]) -> Result<RecordBatch> {
        if entries.is_empty() {
            anyhow::bail!("Cannot create batch from empty entries");
        }

        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != self.dimension) {
            anyhow::bail!(
                "Embedding dimension mismatch for node {}: got {}, expected {}",
                bad.node_id,
                bad.embedding.len(),
                self.dimension
            );
        }

        let node_ids: Vec<&str> = entries.iter().map(|e| e.node_id.as_str()).collect();
        let ref_doc_ids: Vec<&str> = entries.iter().map(|e| e.ref_doc_id.as_str()).collect();

        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        let batch = RecordBatch::try_new(
            Arc::new(self.create_schema()),
            vec![
                Arc::new(StringArray::from(node_ids)),
                Arc::new(StringArray::from(ref_doc_ids)),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")?;

        Ok(batch)
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.contains(&self.table_name))
            .unwrap_or(false)
    }

    async fn open_table(&self) -> Result<lancedb::table::Table> {
        self.db
            .open_table(&self.table_name)
            .execute()
            .await
            .with_context(|| format!("Failed to open table {}", self.table_name))
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let batch = self.entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await {
            self.open_table()
                .await?
                .add(batches)
                .execute()
                .await
                .context("Failed to add vectors to table")?;
        } else {
            self.db
                .create_table(&self.table_name, batches)
                .execute()
                .await
                .context("Failed to create table")?;
        }

        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        if !self.table_exists().await {
            return Ok(vec![]);
        }

        let table = self.open_table().await?;

        let stream = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;
        let mut results = Vec::new();

        for batch in batches {
            let node_ids = batch
                .column_by_name("node_id")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| anyhow::anyhow!("Missing node_id column"))?;

            let ref_doc_ids = batch
                .column_by_name("ref_doc_id")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| anyhow::anyhow!("Missing ref_doc_id column"))?;

            let embeddings = batch
                .column_by_name("embedding")
                .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
                .ok_or_else(|| anyhow::anyhow!("Missing embedding column"))?;

            for i in 0..batch.num_rows() {
                let row = embeddings.value(i);
                let values = row
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .ok_or_else(|| anyhow::anyhow!("Unexpected embedding value type"))?;

                results.push(SearchResult {
                    node_id: node_ids.value(i).to_string(),
                    ref_doc_id: ref_doc_ids.value(i).to_string(),
                    similarity: cosine_similarity(query_embedding, values.values()),
                });
            }
        }

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);

        Ok(results)
    }

    async fn delete_by_ref_doc(&self, ref_doc_id: &str) -> Result<usize> {
        if !self.table_exists().await {
            return Ok(0);
        }

        let table = self.open_table().await?;
        let filter = format!("ref_doc_id = {}", sql_literal(ref_doc_id));

        let matching = table
            .count_rows(Some(filter.clone()))
            .await
            .context("Failed to count rows for ref_doc_id")?;

        if matching > 0 {
            table
                .delete(&filter)
                .await
                .context("Failed to delete vectors")?;
        }

        Ok(matching)
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await {
            return Ok(0);
        }

        let count = self
            .open_table()
            .await?
            .count_rows(None)
            .await
            .context("Failed to count rows")?;
        Ok(count)
    }
}

// ============================================================================
// Tests
// ============================================================================
