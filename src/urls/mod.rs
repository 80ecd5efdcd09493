//! URL 장부 모듈 - RSS 수집 URL 중복 제거 및 신규 URL 판별
//!
//! 두 개의 JSON 문서를 관리합니다:
//! - 스테이징 (`data/article_urls.json`): 발견했지만 아직 인덱싱하지 않은 URL
//! - 저장소 (`data/indexes/stored_urls.json`): 이미 인덱싱한 URL (신규 판별 기준)
//!
//! 두 문서 모두 `{"urls": [{"url": "..."}, ...]}` 형태입니다.
//!
//! 동시 실행은 지원하지 않습니다. 한 번에 하나의 프로세스만 파일을 쓴다고
//! 가정하며 파일 잠금은 하지 않습니다.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use thiserror::Error;

/// URL 컬렉션 문서의 기본 키
pub const URLS_KEY: &str = "urls";

// ============================================================================
// Errors / Outcomes
// ============================================================================

/// URL 장부 에러
#[derive(Debug, Error)]
pub enum UrlStoreError {
    /// JSON 파싱 실패 또는 예상과 다른 문서 구조
    #[error("Error decoding JSON from {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// 파일 읽기/쓰기 실패
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl UrlStoreError {
    fn malformed(path: &Path, reason: impl ToString) -> Self {
        Self::Malformed {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// 중복 제거 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupOutcome {
    /// 파일을 다시 썼음
    Rewritten { before: usize, after: usize },
    /// 파일 없음 (아무것도 하지 않음)
    MissingFile,
    /// 키 없음 (아무것도 하지 않음)
    MissingKey,
    /// JSON 파싱 실패 (아무것도 하지 않음)
    Malformed,
}

// ============================================================================
// UrlCollection
// ============================================================================

/// URL 컬렉션 문서 (`{<key>: [record, ...]}`)
///
/// 레코드는 `url` 외의 필드도 그대로 보존합니다.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlCollection {
    key: String,
    records: Vec<Value>,
}

impl UrlCollection {
    /// 빈 컬렉션 생성
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            records: Vec::new(),
        }
    }

    /// 파일에서 로드
    ///
    /// 파일이 없으면 `Ok(None)`을 반환합니다.
    pub fn load(path: &Path, key: &str) -> Result<Option<Self>, UrlStoreError> {
        let Some(value) = read_json(path)? else {
            return Ok(None);
        };

        let records = match value.get(key) {
            Some(Value::Array(items)) => items.clone(),
            Some(_) => return Err(UrlStoreError::malformed(path, format!("'{}' is not an array", key))),
            None => return Err(UrlStoreError::malformed(path, format!("key '{}' not found", key))),
        };

        for record in &records {
            if record_url(record).is_none() {
                return Err(UrlStoreError::malformed(path, "record without a string 'url' field"));
            }
        }

        Ok(Some(Self {
            key: key.to_string(),
            records,
        }))
    }

    /// 파일로 저장 (들여쓰기 2칸)
    pub fn save(&self, path: &Path) -> Result<(), UrlStoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| UrlStoreError::io(path, e))?;
            }
        }

        let mut doc = Map::new();
        doc.insert(self.key.clone(), Value::Array(self.records.clone()));

        let body = serde_json::to_string_pretty(&Value::Object(doc))
            .map_err(|e| UrlStoreError::malformed(path, e))?;

        std::fs::write(path, body).map_err(|e| UrlStoreError::io(path, e))
    }

    /// 레코드 목록
    pub fn records(&self) -> &[Value] {
        &self.records
    }

    /// URL 목록 (문서 순서 유지, 중복 포함)
    pub fn urls(&self) -> Vec<String> {
        self.records
            .iter()
            .filter_map(record_url)
            .map(str::to_string)
            .collect()
    }

    /// URL 추가 (`{"url": ...}` 레코드로)
    pub fn extend_urls<I, S>(&mut self, urls: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.records
            .extend(urls.into_iter().map(|url| json!({ "url": url.into() })));
    }

    /// 같은 URL의 레코드 중 마지막 것만 남김
    ///
    /// 살아남은 레코드는 해당 URL이 처음 등장한 위치에 놓입니다.
    pub fn dedup_last_wins(&mut self) {
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut unique: Vec<Value> = Vec::with_capacity(self.records.len());

        for record in self.records.drain(..) {
            let Some(url) = record_url(&record).map(str::to_string) else {
                continue;
            };

            match positions.get(&url) {
                Some(&pos) => unique[pos] = record,
                None => {
                    positions.insert(url, unique.len());
                    unique.push(record);
                }
            }
        }

        self.records = unique;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// Dedup / Diff
// ============================================================================

/// JSON 파일 내 중복 URL 제거 (마지막 레코드 우선)
///
/// 파일이 없거나, 키가 없거나, JSON이 잘못되었으면 파일을 건드리지 않고
/// 해당 상황을 보고합니다. 쓰기 자체가 실패한 경우에만 에러를 반환합니다.
pub fn remove_duplicate_elements(path: &Path, key: &str) -> Result<DedupOutcome, UrlStoreError> {
    let value = match read_json(path) {
        Ok(Some(value)) => value,
        Ok(None) => {
            tracing::warn!("File {} does not exist.", path.display());
            return Ok(DedupOutcome::MissingFile);
        }
        Err(UrlStoreError::Malformed { reason, .. }) => {
            tracing::warn!("Error decoding JSON from {}: {}", path.display(), reason);
            return Ok(DedupOutcome::Malformed);
        }
        Err(e) => return Err(e),
    };

    if value.get(key).is_none() {
        tracing::warn!("Key {} not found in {}", key, path.display());
        return Ok(DedupOutcome::MissingKey);
    }

    let mut collection = match UrlCollection::load(path, key) {
        Ok(Some(collection)) => collection,
        Ok(None) => return Ok(DedupOutcome::MissingFile),
        Err(UrlStoreError::Malformed { reason, .. }) => {
            tracing::warn!("Unexpected document shape in {}: {}", path.display(), reason);
            return Ok(DedupOutcome::Malformed);
        }
        Err(e) => return Err(e),
    };

    let before = collection.len();
    collection.dedup_last_wins();
    let after = collection.len();

    collection.save(path)?;
    tracing::debug!("Deduplicated {}: {} -> {} records", path.display(), before, after);

    Ok(DedupOutcome::Rewritten { before, after })
}

/// 스테이징에만 있는 URL 목록 (`staging − store`)
///
/// - 저장소 파일이 없으면 기존 URL 집합을 비어 있는 것으로 간주합니다.
/// - 스테이징 파일이 없으면 빈 목록을 반환합니다.
/// - 어느 한쪽 JSON이 잘못되었으면 `UrlStoreError::Malformed`를 반환합니다.
///   "새 URL 없음"(`Ok(vec![])`)과 구분됩니다.
///
/// 결과는 스테이징 문서 순서를 유지하며, 스테이징 내 중복은 제거하지 않습니다.
pub fn get_unique_elements(store_path: &Path, staging_path: &Path) -> Result<Vec<String>, UrlStoreError> {
    let existing: HashSet<String> = match UrlCollection::load(store_path, URLS_KEY)? {
        Some(store) => store.urls().into_iter().collect(),
        None => {
            tracing::info!("File {} does not exist.", store_path.display());
            HashSet::new()
        }
    };

    let Some(staging) = UrlCollection::load(staging_path, URLS_KEY)? else {
        tracing::info!("Article data file {} does not exist.", staging_path.display());
        return Ok(Vec::new());
    };

    Ok(staging
        .urls()
        .into_iter()
        .filter(|url| !existing.contains(url))
        .collect())
}

/// 아직 없는 URL만 문서 끝에 추가 (문서가 없으면 생성)
///
/// 쓴 뒤의 문서에는 같은 URL이 두 번 나오지 않습니다. 반환값은 전체 레코드 수.
/// 기존 문서의 JSON이 잘못되었으면 아무것도 쓰지 않고 에러를 반환합니다.
pub fn append_urls(path: &Path, urls: &[String]) -> Result<usize, UrlStoreError> {
    let mut collection = UrlCollection::load(path, URLS_KEY)?.unwrap_or_else(|| UrlCollection::new(URLS_KEY));
    collection.dedup_last_wins();

    let mut seen: HashSet<String> = collection.urls().into_iter().collect();
    let fresh: Vec<String> = urls
        .iter()
        .filter(|url| seen.insert((*url).clone()))
        .cloned()
        .collect();

    collection.extend_urls(fresh);
    collection.save(path)?;
    Ok(collection.len())
}

/// 문서를 빈 목록으로 초기화 (`{"urls": []}`)
pub fn truncate(path: &Path) -> Result<(), UrlStoreError> {
    UrlCollection::new(URLS_KEY).save(path)
}

/// RSS 피드 목록 읽기 (읽기 전용 입력)
///
/// 파일이 없으면 `Ok(None)`.
pub fn read_feed_list(path: &Path) -> Result<Option<Vec<String>>, UrlStoreError> {
    Ok(UrlCollection::load(path, URLS_KEY)?.map(|c| c.urls()))
}

// ============================================================================
// Helper Functions
// ============================================================================

/// JSON 파일 읽기 (없으면 `Ok(None)`)
fn read_json(path: &Path) -> Result<Option<Value>, UrlStoreError> {
    let body = match std::fs::read_to_string(path) {
        Ok(body) => body,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(UrlStoreError::io(path, e)),
    };

    serde_json::from_str(&body)
        .map(Some)
        .map_err(|e| UrlStoreError::malformed(path, e))
}

fn record_url(record: &Value) -> Option<&str> {
    record.get("url").and_then(Value::as_str)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn read(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_dedup_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "staging.json",
            r#"{"urls":[{"url":"x","tag":1},{"url":"x","tag":2}]}"#,
        );

        let outcome = remove_duplicate_elements(&path, "urls").unwrap();
        assert_eq!(outcome, DedupOutcome::Rewritten { before: 2, after: 1 });
        assert_eq!(read(&path), json!({"urls": [{"url": "x", "tag": 2}]}));
    }

    #[test]
    fn test_dedup_keeps_first_position() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "staging.json",
            r#"{"urls":[{"url":"a"},{"url":"b"},{"url":"a","n":3},{"url":"c"}]}"#,
        );

        remove_duplicate_elements(&path, "urls").unwrap();
        let collection = UrlCollection::load(&path, "urls").unwrap().unwrap();
        assert_eq!(collection.urls(), vec!["a", "b", "c"]);
        assert_eq!(collection.records()[0], json!({"url": "a", "n": 3}));
    }

    #[test]
    fn test_dedup_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "staging.json",
            r#"{"urls":[{"url":"a"},{"url":"b"},{"url":"a"},{"url":"b"},{"url":"c"}]}"#,
        );

        remove_duplicate_elements(&path, "urls").unwrap();
        let once = std::fs::read_to_string(&path).unwrap();

        let outcome = remove_duplicate_elements(&path, "urls").unwrap();
        let twice = std::fs::read_to_string(&path).unwrap();

        assert_eq!(once, twice);
        assert_eq!(outcome, DedupOutcome::Rewritten { before: 3, after: 3 });
    }

    #[test]
    fn test_dedup_missing_file_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.json");

        let outcome = remove_duplicate_elements(&path, "urls").unwrap();
        assert_eq!(outcome, DedupOutcome::MissingFile);
        assert!(!path.exists());
    }

    #[test]
    fn test_dedup_missing_key_is_noop() {
        let dir = TempDir::new().unwrap();
        let body = r#"{"links":[{"url":"a"},{"url":"a"}]}"#;
        let path = write(&dir, "staging.json", body);

        let outcome = remove_duplicate_elements(&path, "urls").unwrap();
        assert_eq!(outcome, DedupOutcome::MissingKey);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), body);
    }

    #[test]
    fn test_dedup_malformed_is_noop() {
        let dir = TempDir::new().unwrap();
        let body = r#"{"urls":[{"url":"a"},"#;
        let path = write(&dir, "staging.json", body);

        let outcome = remove_duplicate_elements(&path, "urls").unwrap();
        assert_eq!(outcome, DedupOutcome::Malformed);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), body);
    }

    #[test]
    fn test_diff_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("stored_urls.json");
        let staging = write(
            &dir,
            "article_urls.json",
            r#"{"urls":[{"url":"http://a"},{"url":"http://b"}]}"#,
        );

        let new_urls = get_unique_elements(&store, &staging).unwrap();
        assert_eq!(new_urls, vec!["http://a", "http://b"]);
    }

    #[test]
    fn test_diff_excludes_stored() {
        let dir = TempDir::new().unwrap();
        let store = write(&dir, "stored_urls.json", r#"{"urls":[{"url":"http://a"}]}"#);
        let staging = write(
            &dir,
            "article_urls.json",
            r#"{"urls":[{"url":"http://a"},{"url":"http://b"}]}"#,
        );

        let new_urls = get_unique_elements(&store, &staging).unwrap();
        assert_eq!(new_urls, vec!["http://b"]);
    }

    #[test]
    fn test_diff_preserves_staging_order_and_duplicates() {
        let dir = TempDir::new().unwrap();
        let store = write(&dir, "stored_urls.json", r#"{"urls":[{"url":"m"}]}"#);
        let staging = write(
            &dir,
            "article_urls.json",
            r#"{"urls":[{"url":"z"},{"url":"m"},{"url":"a"},{"url":"z"}]}"#,
        );

        let new_urls = get_unique_elements(&store, &staging).unwrap();
        assert_eq!(new_urls, vec!["z", "a", "z"]);
    }

    #[test]
    fn test_diff_missing_staging() {
        let dir = TempDir::new().unwrap();
        let store = write(&dir, "stored_urls.json", r#"{"urls":[{"url":"a"}]}"#);
        let staging = dir.path().join("article_urls.json");

        let new_urls = get_unique_elements(&store, &staging).unwrap();
        assert!(new_urls.is_empty());
    }

    #[test]
    fn test_diff_malformed_is_distinct_from_empty() {
        let dir = TempDir::new().unwrap();
        let store_body = "not json";
        let store = write(&dir, "stored_urls.json", store_body);
        let staging_body = r#"{"urls":[{"url":"a"}]}"#;
        let staging = write(&dir, "article_urls.json", staging_body);

        let result = get_unique_elements(&store, &staging);
        assert!(matches!(result, Err(UrlStoreError::Malformed { .. })));

        // 파일은 그대로
        assert_eq!(std::fs::read_to_string(&store).unwrap(), store_body);
        assert_eq!(std::fs::read_to_string(&staging).unwrap(), staging_body);
    }

    #[test]
    fn test_diff_malformed_staging_with_valid_store() {
        let dir = TempDir::new().unwrap();
        let store = write(&dir, "stored_urls.json", r#"{"urls":[{"url":"a"}]}"#);
        let staging = write(&dir, "article_urls.json", r#"{"urls":[{"url":"b"}"#);

        let result = get_unique_elements(&store, &staging);
        match result {
            Err(UrlStoreError::Malformed { path, .. }) => assert_eq!(path, staging),
            other => panic!("expected malformed staging, got {:?}", other),
        }
    }

    #[test]
    fn test_append_creates_and_extends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("stored_urls.json");

        assert_eq!(append_urls(&path, &["a".to_string()]).unwrap(), 1);
        assert_eq!(append_urls(&path, &["b".to_string(), "c".to_string()]).unwrap(), 3);

        let collection = UrlCollection::load(&path, URLS_KEY).unwrap().unwrap();
        assert_eq!(collection.urls(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_append_skips_present_urls() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "article_urls.json",
            r#"{"urls":[{"url":"a"},{"url":"b"},{"url":"a","title":"A"}]}"#,
        );

        let urls = ["b", "c", "a", "c"].map(String::from);
        assert_eq!(append_urls(&path, &urls).unwrap(), 3);

        let collection = UrlCollection::load(&path, URLS_KEY).unwrap().unwrap();
        assert_eq!(collection.urls(), vec!["a", "b", "c"]);
        // 기존 레코드 중복은 마지막 것이 남음
        assert_eq!(read(&path)["urls"][0]["title"], "A");
    }

    #[test]
    fn test_append_refuses_malformed() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "stored_urls.json", "{oops");

        assert!(append_urls(&path, &["a".to_string()]).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{oops");
    }

    #[test]
    fn test_truncate() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "article_urls.json", r#"{"urls":[{"url":"a"}]}"#);

        truncate(&path).unwrap();
        assert_eq!(read(&path), json!({"urls": []}));
    }

    #[test]
    fn test_read_feed_list() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "rss_urls.json",
            r#"{"urls":[{"url":"https://example.com/feed.xml"}]}"#,
        );

        let feeds = read_feed_list(&path).unwrap().unwrap();
        assert_eq!(feeds, vec!["https://example.com/feed.xml"]);
        assert!(read_feed_list(&dir.path().join("none.json")).unwrap().is_none());
    }
}
