//! 인덱스 빌드/갱신/질의 파이프라인
//!
//! - 파일: 문서 폴더 → 새 저장소 → 요약 인덱스 + 벡터 인덱스 → `variables.txt`
//! - RSS/URL: 피드 링크 수집 → 스테이징 중복 제거 → 저장소와 비교 → 새 기사만 색인
//! - 질의: 두 인덱스를 도구로 묶은 라우터
//!
//! ```text
//! Idle → Collecting → Deduplicating → Diffing ─┬─ (새 URL 없음) → Idle
//!                                               └─ Loading → Indexing → Persisting → Idle
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;

use crate::config::Paths;
use crate::context::ServiceContext;
use crate::knowledge::{
    meta, BaseIndex, DocStoreStats, Document, DocumentSummaryIndex, IndexIds, LlmSingleSelector, QueryEngine,
    QueryEngineTool, Response, RouterQueryEngine, StorageContext, VectorStoreIndex,
    SUMMARY_TOOL_DESCRIPTION, VECTOR_TOOL_DESCRIPTION,
};
use crate::loader::{DirectoryReader, UrlLoader};
use crate::urls::{self, DedupOutcome, UrlCollection, UrlStoreError, URLS_KEY};

// ============================================================================
// Reports
// ============================================================================

/// 파일 빌드 결과
#[derive(Debug, Clone)]
pub struct FileBuildReport {
    pub ids: IndexIds,
    pub documents: usize,
    pub nodes: usize,
    /// 문서별 요약 인덱스 갱신 여부
    pub summary_refreshed: Vec<bool>,
    /// 문서별 벡터 인덱스 갱신 여부
    pub vector_refreshed: Vec<bool>,
    /// 빌드 후 저장소 통계
    pub stats: DocStoreStats,
}

/// 피드 링크 수집 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectOutcome {
    /// 피드 목록 파일 없음
    MissingFeedList,
    /// 피드 목록 JSON이 잘못됨
    MalformedFeedList,
    /// 피드에 링크가 하나도 없음
    NoLinks,
    /// 스테이징 JSON이 잘못되어 추가하지 않음
    MalformedStaging,
    /// 스테이징에 추가함
    Appended { links: usize, staged: usize },
}

/// URL 색인 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlIndexOutcome {
    /// 새 URL 없음
    NothingNew,
    /// 새 URL을 색인하고 저장소에 기록함
    ///
    /// `skipped`는 응답이 없어 색인하지 못한 URL입니다. 저장소에 기록하지 않고
    /// 스테이징에서만 빠지므로, 피드에 다시 나타나면 다음 갱신 때 재시도됩니다.
    Indexed {
        urls: Vec<String>,
        skipped: Vec<String>,
        nodes: usize,
    },
    /// 저장소 JSON이 잘못되어 기록하지 못함 (스테이징 유지)
    StoreMalformed,
}

/// RSS 갱신 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RssUpdateReport {
    pub collected: CollectOutcome,
    pub indexed: UrlIndexOutcome,
}

// ============================================================================
// Files
// ============================================================================

/// 문서 폴더로 두 인덱스를 새로 만듦
///
/// 기존 저장소는 지우고 새 인덱스 ID를 `variables.txt`에 기록합니다.
pub async fn construct_index_with_file(service: &ServiceContext) -> Result<FileBuildReport> {
    let paths = &service.settings().paths;

    let documents = DirectoryReader::new(&paths.documents_dir).load_data().await?;
    let nodes = service.node_parser().get_nodes_from_documents(&documents);
    tracing::info!("Parsed {} nodes from {} documents", nodes.len(), documents.len());

    let storage = StorageContext::create_fresh(&paths.index_dir)?;
    storage.docstore().add_nodes(&nodes)?;

    let ids = IndexIds::generate();

    tracing::info!("Building summary index {}", ids.list_id);
    let summary_index =
        DocumentSummaryIndex::build(&ids.list_id, &nodes, storage.clone(), service.clone()).await?;

    tracing::info!("Building vector index {}", ids.vector_id);
    let vector_index =
        VectorStoreIndex::build(&ids.vector_id, &nodes, storage.clone(), service.clone()).await?;

    ids.save(&paths.variables_file)?;

    let summary_refreshed = summary_index.refresh_ref_docs(&documents).await?;
    let vector_refreshed = vector_index.refresh_ref_docs(&documents).await?;

    Ok(FileBuildReport {
        ids,
        documents: documents.len(),
        nodes: nodes.len(),
        summary_refreshed,
        vector_refreshed,
        stats: storage.docstore().stats()?,
    })
}

// ============================================================================
// RSS / URL
// ============================================================================

/// 인덱스 저장소가 있는지 확인 (URL 갱신은 파일 빌드 이후에만 가능)
pub fn ensure_index_dir(paths: &Paths) -> Result<()> {
    if !paths.index_dir.is_dir() {
        anyhow::bail!(
            "Index dir {} does not exist. Create indexes with files first.",
            paths.index_dir.display()
        );
    }
    Ok(())
}

/// 피드 링크를 수집하고 새 기사를 색인
pub async fn update_index_with_rss(
    service: &ServiceContext,
    ids: &IndexIds,
    feeds: &dyn UrlLoader,
    articles: &dyn UrlLoader,
) -> Result<RssUpdateReport> {
    let paths = &service.settings().paths;
    ensure_index_dir(paths)?;

    let collected = create_urllist_with_rss(paths, feeds).await?;
    let indexed = construct_index_with_urls(service, ids, articles).await?;

    Ok(RssUpdateReport { collected, indexed })
}

/// 피드 목록의 항목 링크를 스테이징 문서에 추가
pub async fn create_urllist_with_rss(paths: &Paths, feeds: &dyn UrlLoader) -> Result<CollectOutcome> {
    let feed_urls = match urls::read_feed_list(&paths.rss_urls) {
        Ok(Some(feed_urls)) => feed_urls,
        Ok(None) => {
            tracing::warn!("RSS URL file {} does not exist.", paths.rss_urls.display());
            return Ok(CollectOutcome::MissingFeedList);
        }
        Err(UrlStoreError::Malformed { path, reason }) => {
            tracing::warn!("Error decoding JSON from {}: {}", path.display(), reason);
            return Ok(CollectOutcome::MalformedFeedList);
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!("[RSS] Loading {} feeds via {}", feed_urls.len(), feeds.name());
    let documents = feeds.load_data(&feed_urls).await?;

    let links = unique_in_order(
        documents
            .iter()
            .filter_map(|doc| doc.metadata.get(meta::LINK).cloned()),
    );
    if links.is_empty() {
        tracing::info!("[RSS] No item links found");
        return Ok(CollectOutcome::NoLinks);
    }

    match urls::append_urls(&paths.article_urls, &links) {
        Ok(staged) => {
            tracing::info!("[RSS] {} links added to {}", links.len(), paths.article_urls.display());
            Ok(CollectOutcome::Appended {
                links: links.len(),
                staged,
            })
        }
        Err(UrlStoreError::Malformed { path, reason }) => {
            tracing::warn!("Error decoding JSON from {}: {}", path.display(), reason);
            Ok(CollectOutcome::MalformedStaging)
        }
        Err(e) => Err(e.into()),
    }
}

/// 스테이징 URL 중 아직 색인하지 않은 것만 두 인덱스에 추가
///
/// 성공하면 읽어 온 URL을 저장소 문서에 기록하고 스테이징을 비웁니다.
/// 로더가 건너뛴 URL(죽은 링크)은 저장소에 기록하지 않습니다.
pub async fn construct_index_with_urls(
    service: &ServiceContext,
    ids: &IndexIds,
    articles: &dyn UrlLoader,
) -> Result<UrlIndexOutcome> {
    let paths = &service.settings().paths;

    match urls::remove_duplicate_elements(&paths.article_urls, URLS_KEY)? {
        DedupOutcome::Rewritten { before, after } if before != after => {
            tracing::info!("[URL] Removed {} duplicate staged URLs", before - after);
        }
        _ => {}
    }

    let new_urls = match urls::get_unique_elements(&paths.stored_urls, &paths.article_urls) {
        Ok(new_urls) => unique_in_order(new_urls),
        Err(UrlStoreError::Malformed { path, reason }) => {
            tracing::warn!("Error decoding JSON from {}: {}", path.display(), reason);
            Vec::new()
        }
        Err(e) => return Err(e.into()),
    };

    if new_urls.is_empty() {
        tracing::info!("[URL] Nothing to do...");
        return Ok(UrlIndexOutcome::NothingNew);
    }

    tracing::info!("[URL] Loading {} URLs via {}", new_urls.len(), articles.name());
    let documents = articles.load_data(&new_urls).await?;
    let (loaded, skipped) = partition_loaded(new_urls, &documents);
    for url in &skipped {
        tracing::warn!("[URL] Not indexed (no document): {}", url);
    }
    let nodes = service.node_parser().get_nodes_from_documents(&documents);

    if !nodes.is_empty() {
        let storage = StorageContext::open(&paths.index_dir)?;
        storage.docstore().add_nodes(&nodes)?;

        let summary_index = DocumentSummaryIndex::load(&ids.list_id, storage.clone(), service.clone())?;
        let vector_index = VectorStoreIndex::load(&ids.vector_id, storage, service.clone()).await?;

        summary_index.insert_nodes(&nodes).await?;
        vector_index.insert_nodes(&nodes).await?;
    }

    let mut store = match UrlCollection::load(&paths.stored_urls, URLS_KEY) {
        Ok(store) => store.unwrap_or_else(|| UrlCollection::new(URLS_KEY)),
        Err(UrlStoreError::Malformed { path, reason }) => {
            tracing::warn!("Error decoding JSON from {}: {}", path.display(), reason);
            return Ok(UrlIndexOutcome::StoreMalformed);
        }
        Err(e) => return Err(e.into()),
    };
    store.extend_urls(loaded.iter().cloned());
    store.save(&paths.stored_urls)?;

    tracing::info!("[URL] Cleaning {}...", paths.article_urls.display());
    urls::truncate(&paths.article_urls)?;

    Ok(UrlIndexOutcome::Indexed {
        urls: loaded,
        skipped,
        nodes: nodes.len(),
    })
}

// ============================================================================
// Query
// ============================================================================

/// 저장된 두 인덱스로 라우터 질의 엔진 구성
pub async fn load_query_engine(service: &ServiceContext, ids: &IndexIds) -> Result<RouterQueryEngine> {
    let paths = &service.settings().paths;
    ensure_index_dir(paths)?;
    let storage = StorageContext::open(&paths.index_dir)?;

    tracing::info!("Load DocumentSummaryIndex {}", ids.list_id);
    let summary_index = DocumentSummaryIndex::load(&ids.list_id, storage.clone(), service.clone())?;

    tracing::info!("Load VectorStoreIndex {}", ids.vector_id);
    let vector_index = VectorStoreIndex::load(&ids.vector_id, storage, service.clone()).await?;

    let top_k = service.settings().retrieval.similarity_top_k;
    let tools = vec![
        QueryEngineTool::new(
            Arc::new(summary_index.as_query_engine()),
            SUMMARY_TOOL_DESCRIPTION,
        ),
        QueryEngineTool::new(
            Arc::new(vector_index.as_query_engine(top_k)),
            VECTOR_TOOL_DESCRIPTION,
        ),
    ];

    let selector = LlmSingleSelector::new(service.llm().clone(), service.templates().clone());
    RouterQueryEngine::new(selector, tools)
}

/// 질의 하나 실행
pub async fn query_with_index(service: &ServiceContext, ids: &IndexIds, query: &str) -> Result<Response> {
    load_query_engine(service, ids).await?.query(query).await
}

/// 요청한 URL을 문서가 나온 것과 나오지 않은 것으로 나눔 (순서 유지)
///
/// 문서 ID 또는 `url` 메타데이터가 요청 URL과 같으면 읽어 온 것으로 봅니다.
fn partition_loaded(requested: Vec<String>, documents: &[Document]) -> (Vec<String>, Vec<String>) {
    let returned: HashSet<&str> = documents
        .iter()
        .flat_map(|doc| {
            std::iter::once(doc.doc_id.as_str()).chain(doc.metadata.get(meta::URL).map(String::as_str))
        })
        .collect();

    requested
        .into_iter()
        .partition(|url| returned.contains(url.as_str()))
}

/// 순서를 유지한 중복 제거
fn unique_in_order(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::knowledge::{SELECTED_TOOL_KEY, SELECTOR_REASON_KEY};
    use crate::testing::{service_context_with, ScriptedLlm};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// 정해진 문서를 돌려주는 로더
    struct StaticLoader {
        documents: Vec<Document>,
        calls: AtomicUsize,
    }

    impl StaticLoader {
        fn new(documents: Vec<Document>) -> Self {
            Self {
                documents,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl UrlLoader for StaticLoader {
        async fn load_data(&self, _urls: &[String]) -> Result<Vec<Document>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.documents.clone())
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    fn scripted() -> Arc<ScriptedLlm> {
        Arc::new(ScriptedLlm::new(|prompt| {
            if prompt.contains("Some choices are given below") {
                r#"{"choice": 2, "reason": "asks for a specific fact"}"#.to_string()
            } else if prompt.contains("A list of documents is shown below") {
                "Doc: 1, Relevance: 9".to_string()
            } else if prompt.contains("Describe what the provided text is about") {
                "a short summary".to_string()
            } else {
                "final answer".to_string()
            }
        }))
    }

    fn settings_in(dir: &Path) -> Settings {
        let mut settings = Settings::default();
        settings.paths = Paths::with_data_dir(&dir.join("data"));
        settings.paths.variables_file = dir.join("variables.txt");
        settings
    }

    fn write_json(path: &Path, value: Value) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
    }

    fn read_urls(path: &Path) -> Vec<String> {
        UrlCollection::load(path, URLS_KEY).unwrap().unwrap().urls()
    }

    fn write_documents(paths: &Paths) {
        std::fs::create_dir_all(&paths.documents_dir).unwrap();
        std::fs::write(
            paths.documents_dir.join("apples.md"),
            "Apple orchards need pruning every winter.",
        )
        .unwrap();
        std::fs::write(
            paths.documents_dir.join("rust.md"),
            "Rust ownership rules prevent data races.",
        )
        .unwrap();
    }

    fn article(url: &str, text: &str) -> Document {
        Document::new(url, text).with_meta(meta::URL, url)
    }

    #[test]
    fn test_unique_in_order() {
        let items = ["b", "a", "b", "c", "a"].map(String::from);
        assert_eq!(unique_in_order(items), vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_construct_index_with_file() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(dir.path());
        write_documents(&settings.paths);
        let service = service_context_with(scripted(), settings.clone());

        let report = construct_index_with_file(&service).await.unwrap();

        assert_eq!(report.documents, 2);
        assert!(report.nodes >= 2);
        // 방금 빌드한 문서는 다시 갱신하지 않음
        assert_eq!(report.summary_refreshed, vec![false, false]);
        assert_eq!(report.vector_refreshed, vec![false, false]);
        assert_eq!(report.stats.ref_doc_count, 2);
        assert_eq!(report.stats.index_count, 2);

        let saved = IndexIds::load(&settings.paths.variables_file).unwrap().unwrap();
        assert_eq!(saved, report.ids);
        assert!(settings.paths.index_dir.is_dir());
    }

    #[tokio::test]
    async fn test_update_requires_index_dir() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(dir.path());
        write_json(&settings.paths.rss_urls, json!({"urls": [{"url": "https://feed.example.com/rss"}]}));
        let service = service_context_with(scripted(), settings.clone());

        let feeds = StaticLoader::new(vec![]);
        let articles = StaticLoader::new(vec![]);
        let result =
            update_index_with_rss(&service, &IndexIds::new("a", "b"), &feeds, &articles).await;

        let message = result.unwrap_err().to_string();
        assert!(message.contains("does not exist"));
        assert_eq!(feeds.calls(), 0);
        assert!(!settings.paths.article_urls.exists());
    }

    #[tokio::test]
    async fn test_create_urllist_missing_feed_list() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::with_data_dir(dir.path());
        let feeds = StaticLoader::new(vec![]);

        let outcome = create_urllist_with_rss(&paths, &feeds).await.unwrap();

        assert_eq!(outcome, CollectOutcome::MissingFeedList);
        assert_eq!(feeds.calls(), 0);
        assert!(!paths.article_urls.exists());
    }

    #[tokio::test]
    async fn test_create_urllist_appends_links_in_order() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::with_data_dir(dir.path());
        write_json(&paths.rss_urls, json!({"urls": [{"url": "https://feed.example.com/rss"}]}));
        write_json(
            &paths.article_urls,
            json!({"urls": [
                {"url": "https://x.example.com/old"},
                {"url": "https://x.example.com/1"}
            ]}),
        );

        let item = |link: &str| Document::new(link, "").with_meta(meta::LINK, link);
        let feeds = StaticLoader::new(vec![
            item("https://x.example.com/2"),
            item("https://x.example.com/1"),
            item("https://x.example.com/2"),
        ]);

        let outcome = create_urllist_with_rss(&paths, &feeds).await.unwrap();

        assert_eq!(outcome, CollectOutcome::Appended { links: 2, staged: 3 });
        let staged = read_urls(&paths.article_urls);
        assert_eq!(
            staged,
            vec![
                "https://x.example.com/old",
                "https://x.example.com/1",
                "https://x.example.com/2"
            ]
        );
        // 이미 대기 중이던 링크는 한 번만
        assert_eq!(staged.iter().filter(|u| *u == "https://x.example.com/1").count(), 1);

        // 같은 피드를 다시 읽어도 스테이징은 늘지 않음
        let again = create_urllist_with_rss(&paths, &feeds).await.unwrap();
        assert_eq!(again, CollectOutcome::Appended { links: 2, staged: 3 });
        assert_eq!(read_urls(&paths.article_urls), staged);
    }

    #[tokio::test]
    async fn test_dead_links_only_clears_staging() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(dir.path());
        let paths = &settings.paths;
        write_json(&paths.article_urls, json!({"urls": [{"url": "https://gone.example.com/a"}]}));
        let service = service_context_with(scripted(), settings.clone());
        // 로더가 404 링크를 건너뛴 상황
        let articles = StaticLoader::new(vec![]);

        let outcome = construct_index_with_urls(&service, &IndexIds::new("a", "b"), &articles)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            UrlIndexOutcome::Indexed {
                urls: vec![],
                skipped: vec!["https://gone.example.com/a".to_string()],
                nodes: 0,
            }
        );
        assert!(read_urls(&paths.article_urls).is_empty());
        assert!(read_urls(&paths.stored_urls).is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_article_does_not_block_staging() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(dir.path());
        let paths = settings.paths.clone();
        write_documents(&paths);
        let service = service_context_with(scripted(), settings);
        let ids = construct_index_with_file(&service).await.unwrap().ids;

        write_json(
            &paths.article_urls,
            json!({"urls": [
                {"url": "https://gone.example.com/404"},
                {"url": "https://live.example.com/figs"}
            ]}),
        );
        // 죽은 링크는 로더가 건너뛰고 살아 있는 기사만 돌려줌
        let articles = StaticLoader::new(vec![article(
            "https://live.example.com/figs",
            "Fig trees fruit twice a year.",
        )]);

        let outcome = construct_index_with_urls(&service, &ids, &articles).await.unwrap();

        assert_eq!(
            outcome,
            UrlIndexOutcome::Indexed {
                urls: vec!["https://live.example.com/figs".to_string()],
                skipped: vec!["https://gone.example.com/404".to_string()],
                nodes: 1,
            }
        );
        assert_eq!(read_urls(&paths.stored_urls), vec!["https://live.example.com/figs"]);
        assert!(read_urls(&paths.article_urls).is_empty());

        // 다음 갱신은 막히지 않음
        let next = construct_index_with_urls(&service, &ids, &articles).await.unwrap();
        assert_eq!(next, UrlIndexOutcome::NothingNew);
        assert_eq!(articles.calls(), 1);
    }

    #[tokio::test]
    async fn test_construct_with_urls_nothing_new() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(dir.path());
        let paths = &settings.paths;
        write_json(&paths.stored_urls, json!({"urls": [{"url": "https://a.example.com"}]}));
        write_json(
            &paths.article_urls,
            json!({"urls": [{"url": "https://a.example.com"}, {"url": "https://a.example.com"}]}),
        );
        let service = service_context_with(scripted(), settings.clone());
        let articles = StaticLoader::new(vec![]);

        let outcome = construct_index_with_urls(&service, &IndexIds::new("a", "b"), &articles)
            .await
            .unwrap();

        assert_eq!(outcome, UrlIndexOutcome::NothingNew);
        assert_eq!(articles.calls(), 0);
        // 스테이징은 중복만 제거되고 비워지지 않음
        assert_eq!(read_urls(&paths.article_urls), vec!["https://a.example.com"]);
    }

    #[tokio::test]
    async fn test_malformed_store_keeps_staging() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(dir.path());
        let paths = &settings.paths;
        std::fs::create_dir_all(paths.stored_urls.parent().unwrap()).unwrap();
        std::fs::write(&paths.stored_urls, "{ not json").unwrap();
        write_json(&paths.article_urls, json!({"urls": [{"url": "https://new.example.com"}]}));
        let service = service_context_with(scripted(), settings.clone());
        let articles = StaticLoader::new(vec![]);

        let outcome = construct_index_with_urls(&service, &IndexIds::new("a", "b"), &articles)
            .await
            .unwrap();

        assert_eq!(outcome, UrlIndexOutcome::NothingNew);
        assert_eq!(articles.calls(), 0);
        assert_eq!(read_urls(&paths.article_urls), vec!["https://new.example.com"]);
        assert_eq!(std::fs::read_to_string(&paths.stored_urls).unwrap(), "{ not json");
    }

    #[tokio::test]
    async fn test_files_then_urls_then_query() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(dir.path());
        let paths = settings.paths.clone();
        write_documents(&paths);
        let llm = scripted();
        let service = service_context_with(llm.clone(), settings);

        let ids = construct_index_with_file(&service).await.unwrap().ids;

        write_json(&paths.stored_urls, json!({"urls": [{"url": "https://old.example.com"}]}));
        write_json(
            &paths.article_urls,
            json!({"urls": [
                {"url": "https://old.example.com"},
                {"url": "https://new.example.com/pears"}
            ]}),
        );
        let articles = StaticLoader::new(vec![article(
            "https://new.example.com/pears",
            "Pear trees bloom early in spring.",
        )]);

        let outcome = construct_index_with_urls(&service, &ids, &articles).await.unwrap();

        match outcome {
            UrlIndexOutcome::Indexed { urls, skipped, nodes } => {
                assert_eq!(urls, vec!["https://new.example.com/pears"]);
                assert!(skipped.is_empty());
                assert_eq!(nodes, 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(
            read_urls(&paths.stored_urls),
            vec!["https://old.example.com", "https://new.example.com/pears"]
        );
        assert!(read_urls(&paths.article_urls).is_empty());

        let response = query_with_index(&service, &ids, "When do pear trees bloom?")
            .await
            .unwrap();

        assert_eq!(response.response, "final answer");
        assert_eq!(
            response.metadata.get(SELECTED_TOOL_KEY).map(String::as_str),
            Some(VECTOR_TOOL_DESCRIPTION)
        );
        assert_eq!(
            response.metadata.get(SELECTOR_REASON_KEY).map(String::as_str),
            Some("asks for a specific fact")
        );
        assert_eq!(response.source_nodes.len(), 3);
        assert!(response.source_nodes.iter().all(|n| n.score.is_some()));
    }
}
