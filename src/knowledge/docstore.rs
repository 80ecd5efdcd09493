//! Document Store - rusqlite 기반 노드 저장소
//!
//! 두 인덱스가 공유하는 노드 원문, 문서 해시, 인덱스 구조, 문서 요약을 저장합니다.
//! 저장 위치: `<index_dir>/docstore.db`

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde::Serialize;

use super::document::{Metadata, Node};

/// docstore 파일 이름
pub const DOCSTORE_FILE: &str = "docstore.db";

// ============================================================================
// Types
// ============================================================================

/// 인덱스 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// 문서 요약 인덱스
    Summary,
    /// 벡터 인덱스
    Vector,
}

impl IndexKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IndexKind::Summary => "summary",
            IndexKind::Vector => "vector",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "summary" => Some(IndexKind::Summary),
            "vector" => Some(IndexKind::Vector),
            _ => None,
        }
    }
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct DocStoreStats {
    pub node_count: usize,
    pub ref_doc_count: usize,
    pub index_count: usize,
    pub db_path: PathBuf,
}

// ============================================================================
// DocStore
// ============================================================================

/// SQLite 노드 저장소
#[derive(Clone)]
pub struct DocStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl DocStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create docstore directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    /// 인덱스 디렉토리 안의 docstore 열기
    pub fn open_in(index_dir: &Path) -> Result<Self> {
        Self::open(&index_dir.join(DOCSTORE_FILE))
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                node_id TEXT PRIMARY KEY,
                ref_doc_id TEXT NOT NULL,
                text TEXT NOT NULL,
                start_char_idx INTEGER,
                end_char_idx INTEGER,
                metadata TEXT NOT NULL DEFAULT '{}'
            );
            CREATE INDEX IF NOT EXISTS idx_nodes_ref_doc ON nodes(ref_doc_id);

            CREATE TABLE IF NOT EXISTS ref_docs (
                index_id TEXT NOT NULL,
                ref_doc_id TEXT NOT NULL,
                doc_hash TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (index_id, ref_doc_id)
            );

            CREATE TABLE IF NOT EXISTS index_structs (
                index_id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS index_nodes (
                index_id TEXT NOT NULL,
                node_id TEXT NOT NULL,
                PRIMARY KEY (index_id, node_id)
            );

            CREATE TABLE IF NOT EXISTS doc_summaries (
                index_id TEXT NOT NULL,
                ref_doc_id TEXT NOT NULL,
                summary TEXT NOT NULL,
                PRIMARY KEY (index_id, ref_doc_id)
            );
            "#,
        )
        .context("Failed to create docstore schema")?;

        tracing::debug!("Docstore initialized at {:?}", self.db_path);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------------

    /// 노드 저장 (같은 node_id는 덮어씀)
    pub fn add_nodes(&self, nodes: &[Node]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO nodes
                 (node_id, ref_doc_id, text, start_char_idx, end_char_idx, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;

            for node in nodes {
                let metadata = serde_json::to_string(&node.metadata)?;
                stmt.execute(params![
                    node.node_id,
                    node.ref_doc_id,
                    node.text,
                    node.start_char_idx.map(|v| v as i64),
                    node.end_char_idx.map(|v| v as i64),
                    metadata,
                ])
                .context("Failed to insert node")?;
            }
        }

        tx.commit()?;
        tracing::debug!("Stored {} nodes", nodes.len());
        Ok(nodes.len())
    }

    /// ID로 노드 조회
    pub fn get_node(&self, node_id: &str) -> Result<Option<Node>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT node_id, ref_doc_id, text, start_char_idx, end_char_idx, metadata
             FROM nodes WHERE node_id = ?1",
        )?;

        let node = stmt.query_row(params![node_id], row_to_node).optional()?;
        Ok(node)
    }

    /// 여러 노드 조회 (요청 순서 유지, 없는 ID는 건너뜀)
    pub fn get_nodes(&self, node_ids: &[String]) -> Result<Vec<Node>> {
        let mut nodes = Vec::with_capacity(node_ids.len());
        for node_id in node_ids {
            match self.get_node(node_id)? {
                Some(node) => nodes.push(node),
                None => tracing::warn!("Node not found in docstore: {}", node_id),
            }
        }
        Ok(nodes)
    }

    /// 문서의 노드 목록 (원문 순서)
    pub fn nodes_for_ref_doc(&self, ref_doc_id: &str) -> Result<Vec<Node>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT node_id, ref_doc_id, text, start_char_idx, end_char_idx, metadata
             FROM nodes WHERE ref_doc_id = ?1
             ORDER BY start_char_idx, rowid",
        )?;

        let nodes = stmt
            .query_map(params![ref_doc_id], row_to_node)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(nodes)
    }

    // ------------------------------------------------------------------------
    // Ref docs
    // ------------------------------------------------------------------------

    /// 인덱스별 문서 해시 저장
    pub fn set_document_hash(&self, index_id: &str, ref_doc_id: &str, hash: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO ref_docs (index_id, ref_doc_id, doc_hash, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![index_id, ref_doc_id, hash, Utc::now().to_rfc3339()],
        )
        .context("Failed to store document hash")?;
        Ok(())
    }

    /// 인덱스별 문서 해시 조회
    pub fn get_document_hash(&self, index_id: &str, ref_doc_id: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let hash = conn
            .query_row(
                "SELECT doc_hash FROM ref_docs WHERE index_id = ?1 AND ref_doc_id = ?2",
                params![index_id, ref_doc_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    /// 인덱스에서 문서를 제거
    ///
    /// 인덱스 소속 정보, 해시, 요약을 지우고 어느 인덱스에도 속하지 않게 된 노드는
    /// 삭제합니다. 인덱스에서 빠진 노드 ID 목록을 반환합니다.
    pub fn delete_ref_doc(&self, index_id: &str, ref_doc_id: &str) -> Result<Vec<String>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let node_ids: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT i.node_id
                 FROM index_nodes i JOIN nodes n ON n.node_id = i.node_id
                 WHERE i.index_id = ?1 AND n.ref_doc_id = ?2",
            )?;
            let ids = stmt
                .query_map(params![index_id, ref_doc_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            ids
        };

        tx.execute(
            "DELETE FROM index_nodes
             WHERE index_id = ?1
               AND node_id IN (SELECT node_id FROM nodes WHERE ref_doc_id = ?2)",
            params![index_id, ref_doc_id],
        )?;
        tx.execute(
            "DELETE FROM nodes
             WHERE ref_doc_id = ?1
               AND node_id NOT IN (SELECT node_id FROM index_nodes)",
            params![ref_doc_id],
        )?;
        tx.execute(
            "DELETE FROM ref_docs WHERE index_id = ?1 AND ref_doc_id = ?2",
            params![index_id, ref_doc_id],
        )?;
        tx.execute(
            "DELETE FROM doc_summaries WHERE index_id = ?1 AND ref_doc_id = ?2",
            params![index_id, ref_doc_id],
        )?;
        tx.commit()?;

        tracing::debug!(
            "Removed ref doc {} from index {} ({} nodes)",
            ref_doc_id,
            index_id,
            node_ids.len()
        );
        Ok(node_ids)
    }

    // ------------------------------------------------------------------------
    // Index structs
    // ------------------------------------------------------------------------

    /// 인덱스 구조 등록
    pub fn add_index_struct(&self, index_id: &str, kind: IndexKind) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO index_structs (index_id, kind, created_at) VALUES (?1, ?2, ?3)",
            params![index_id, kind.as_str(), Utc::now().to_rfc3339()],
        )
        .context("Failed to register index")?;
        Ok(())
    }

    /// 인덱스 종류 조회 (없으면 None)
    pub fn get_index_kind(&self, index_id: &str) -> Result<Option<IndexKind>> {
        let conn = self.lock()?;
        let kind: Option<String> = conn
            .query_row(
                "SELECT kind FROM index_structs WHERE index_id = ?1",
                params![index_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(kind.as_deref().and_then(IndexKind::parse))
    }

    /// 노드를 인덱스에 소속시킴
    pub fn add_index_nodes(&self, index_id: &str, node_ids: &[String]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT OR IGNORE INTO index_nodes (index_id, node_id) VALUES (?1, ?2)")?;
            for node_id in node_ids {
                stmt.execute(params![index_id, node_id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// 인덱스에 속한 문서 ID 목록 (처음 추가된 순서)
    pub fn index_ref_doc_ids(&self, index_id: &str) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT n.ref_doc_id
             FROM index_nodes i JOIN nodes n ON n.node_id = i.node_id
             WHERE i.index_id = ?1
             GROUP BY n.ref_doc_id
             ORDER BY MIN(i.rowid)",
        )?;

        let ids = stmt
            .query_map(params![index_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// 인덱스에 속한 특정 문서의 노드 (원문 순서)
    pub fn index_nodes_for_ref_doc(&self, index_id: &str, ref_doc_id: &str) -> Result<Vec<Node>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT n.node_id, n.ref_doc_id, n.text, n.start_char_idx, n.end_char_idx, n.metadata
             FROM index_nodes i JOIN nodes n ON n.node_id = i.node_id
             WHERE i.index_id = ?1 AND n.ref_doc_id = ?2
             ORDER BY n.start_char_idx, n.rowid",
        )?;

        let nodes = stmt
            .query_map(params![index_id, ref_doc_id], row_to_node)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(nodes)
    }

    // ------------------------------------------------------------------------
    // Summaries
    // ------------------------------------------------------------------------

    /// 문서 요약 저장
    pub fn set_summary(&self, index_id: &str, ref_doc_id: &str, summary: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO doc_summaries (index_id, ref_doc_id, summary) VALUES (?1, ?2, ?3)",
            params![index_id, ref_doc_id, summary],
        )
        .context("Failed to store summary")?;
        Ok(())
    }

    /// 인덱스의 문서 요약 목록 (저장 순서)
    pub fn summaries(&self, index_id: &str) -> Result<Vec<(String, String)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT ref_doc_id, summary FROM doc_summaries WHERE index_id = ?1 ORDER BY rowid",
        )?;

        let rows = stmt
            .query_map(params![index_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(String, String)>>>()?;
        Ok(rows)
    }

    /// 저장소 통계
    pub fn stats(&self) -> Result<DocStoreStats> {
        let conn = self.lock()?;
        let count = |sql: &str| -> usize {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                .unwrap_or(0) as usize
        };

        Ok(DocStoreStats {
            node_count: count("SELECT COUNT(*) FROM nodes"),
            ref_doc_count: count("SELECT COUNT(DISTINCT ref_doc_id) FROM nodes"),
            index_count: count("SELECT COUNT(*) FROM index_structs"),
            db_path: self.db_path.clone(),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn row_to_node(row: &Row<'_>) -> rusqlite::Result<Node> {
    let metadata: String = row.get(5)?;
    Ok(Node {
        node_id: row.get(0)?,
        ref_doc_id: row.get(1)?,
        text: row.get(2)?,
        start_char_idx: row.get::<_, Option<i64>>(3)?.map(|v| v as usize),
        end_char_idx: row.get::<_, Option<i64>>(4)?.map(|v| v as usize),
        metadata: serde_json::from_str::<Metadata>(&metadata).unwrap_or_default(),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, DocStore) {
        let dir = TempDir::new().unwrap();
        let store = DocStore::open_in(dir.path()).unwrap();
        (dir, store)
    }

    fn node(id: &str, doc: &str, start: usize, text: &str) -> Node {
        Node {
            node_id: id.to_string(),
            ref_doc_id: doc.to_string(),
            text: text.to_string(),
            start_char_idx: Some(start),
            end_char_idx: Some(start + text.chars().count()),
            metadata: Metadata::from([("file_name".to_string(), format!("{}.md", doc))]),
        }
    }

    #[test]
    fn test_add_and_get_nodes() {
        let (_dir, store) = create_test_store();
        store
            .add_nodes(&[node("n1", "a", 0, "hello"), node("n2", "a", 5, "world")])
            .unwrap();

        let n1 = store.get_node("n1").unwrap().unwrap();
        assert_eq!(n1.text, "hello");
        assert_eq!(n1.end_char_idx, Some(5));
        assert_eq!(n1.metadata.get("file_name").map(String::as_str), Some("a.md"));

        assert!(store.get_node("missing").unwrap().is_none());

        let nodes = store
            .get_nodes(&["n2".to_string(), "missing".to_string(), "n1".to_string()])
            .unwrap();
        let ids: Vec<&str> = nodes.iter().map(|n| n.node_id.as_str()).collect();
        assert_eq!(ids, vec!["n2", "n1"]);
    }

    #[test]
    fn test_nodes_for_ref_doc_in_source_order() {
        let (_dir, store) = create_test_store();
        store
            .add_nodes(&[node("n2", "a", 10, "second"), node("n1", "a", 0, "first"), node("n3", "b", 0, "other")])
            .unwrap();

        let nodes = store.nodes_for_ref_doc("a").unwrap();
        let texts: Vec<&str> = nodes.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn test_document_hash_per_index() {
        let (_dir, store) = create_test_store();
        assert!(store.get_document_hash("s1", "a").unwrap().is_none());

        store.set_document_hash("s1", "a", "h1").unwrap();
        store.set_document_hash("s1", "a", "h2").unwrap();
        assert_eq!(store.get_document_hash("s1", "a").unwrap(), Some("h2".to_string()));
        assert!(store.get_document_hash("v1", "a").unwrap().is_none());
    }

    #[test]
    fn test_delete_ref_doc_from_one_index() {
        let (_dir, store) = create_test_store();
        store
            .add_nodes(&[node("n1", "a", 0, "x"), node("n2", "a", 1, "y"), node("n3", "b", 0, "z")])
            .unwrap();
        let all = vec!["n1".to_string(), "n2".to_string(), "n3".to_string()];
        store.add_index_nodes("s1", &all).unwrap();
        store.add_index_nodes("v1", &all).unwrap();
        store.set_document_hash("s1", "a", "h").unwrap();
        store.set_document_hash("v1", "a", "h").unwrap();
        store.set_summary("s1", "a", "about a").unwrap();

        let mut deleted = store.delete_ref_doc("s1", "a").unwrap();
        deleted.sort();
        assert_eq!(deleted, vec!["n1", "n2"]);

        // 다른 인덱스가 아직 참조하므로 노드는 남아 있음
        assert!(store.get_node("n1").unwrap().is_some());
        assert!(store.get_document_hash("s1", "a").unwrap().is_none());
        assert_eq!(store.get_document_hash("v1", "a").unwrap(), Some("h".to_string()));
        assert_eq!(store.index_ref_doc_ids("s1").unwrap(), vec!["b"]);
        assert_eq!(store.index_ref_doc_ids("v1").unwrap(), vec!["a", "b"]);
        assert!(store.summaries("s1").unwrap().is_empty());

        store.delete_ref_doc("v1", "a").unwrap();
        assert!(store.get_node("n1").unwrap().is_none());
        assert!(store.nodes_for_ref_doc("a").unwrap().is_empty());
        assert_eq!(store.nodes_for_ref_doc("b").unwrap().len(), 1);
    }

    #[test]
    fn test_index_structs_and_membership() {
        let (_dir, store) = create_test_store();
        store.add_index_struct("s1", IndexKind::Summary).unwrap();
        store.add_index_struct("v1", IndexKind::Vector).unwrap();

        assert_eq!(store.get_index_kind("s1").unwrap(), Some(IndexKind::Summary));
        assert_eq!(store.get_index_kind("v1").unwrap(), Some(IndexKind::Vector));
        assert_eq!(store.get_index_kind("nope").unwrap(), None);

        store
            .add_nodes(&[node("n1", "b", 0, "x"), node("n2", "a", 0, "y")])
            .unwrap();
        store.add_index_nodes("s1", &["n1".to_string()]).unwrap();
        store.add_index_nodes("s1", &["n2".to_string(), "n1".to_string()]).unwrap();

        assert_eq!(store.index_ref_doc_ids("s1").unwrap(), vec!["b", "a"]);
        assert_eq!(store.index_nodes_for_ref_doc("s1", "a").unwrap().len(), 1);
        assert!(store.index_ref_doc_ids("v1").unwrap().is_empty());
    }

    #[test]
    fn test_summaries_and_stats() {
        let (_dir, store) = create_test_store();
        store.add_nodes(&[node("n1", "a", 0, "x")]).unwrap();
        store.add_index_struct("s1", IndexKind::Summary).unwrap();
        store.set_summary("s1", "a", "first").unwrap();
        store.set_summary("s1", "a", "updated").unwrap();

        assert_eq!(
            store.summaries("s1").unwrap(),
            vec![("a".to_string(), "updated".to_string())]
        );

        let stats = store.stats().unwrap();
        assert_eq!(stats.node_count, 1);
        assert_eq!(stats.ref_doc_count, 1);
        assert_eq!(stats.index_count, 1);
    }
}
