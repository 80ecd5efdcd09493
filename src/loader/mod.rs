//! 로더 모듈 - 원문을 `Document`로 읽어옴
//!
//! - directory: 로컬 문서 폴더 (텍스트 + PDF)
//! - rss: RSS/Atom 피드 항목
//! - web: 기사 HTML 본문

pub mod directory;
pub mod pdf;
pub mod rss;
pub mod web;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use thiserror::Error;

use crate::knowledge::Document;

pub use directory::{DirectoryReader, FileType, ReaderConfig};
pub use rss::{parse_feed, FeedItem, RssReader};
pub use web::{html_to_text, ArticleLoader, ScrapedContent};

/// URL 목록을 문서로 읽는 로더 (피드, 기사)
#[async_trait]
pub trait UrlLoader: Send + Sync {
    /// URL 목록 읽기
    async fn load_data(&self, urls: &[String]) -> Result<Vec<Document>>;

    /// 로더 이름 (로그용)
    fn name(&self) -> &str;
}

/// HTTP User-Agent
const USER_AGENT: &str = "router-rag/0.1";

/// 로더 공용 HTTP 클라이언트
pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .build()
        .context("HTTP 클라이언트 생성 실패")
}

/// 서버가 2xx가 아닌 상태로 응답함 (죽은 링크, 사라진 피드 등)
#[derive(Debug, Error)]
#[error("HTTP {status} from {url}")]
pub struct HttpStatusError {
    pub url: String,
    pub status: reqwest::StatusCode,
}

/// URL 본문을 텍스트로 가져옴 (2xx가 아니면 `HttpStatusError`)
pub(crate) async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("HTTP 요청 실패: {}", url))?;

    let status = response.status();
    if !status.is_success() {
        return Err(HttpStatusError {
            url: url.to_string(),
            status,
        }
        .into());
    }

    response
        .text()
        .await
        .with_context(|| format!("응답 본문 읽기 실패: {}", url))
}

/// URL 하나의 결과에서 HTTP 상태 에러만 건너뜀
///
/// 상태 에러면 경고 후 `Ok(None)`. 전송 실패 등 나머지 에러는 그대로 전파합니다.
pub(crate) fn skip_http_status<T>(url: &str, result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) => match e.downcast_ref::<HttpStatusError>() {
            Some(status_error) => {
                tracing::warn!("Skipping {}: HTTP {}", url, status_error.status);
                Ok(None)
            }
            None => Err(e),
        },
    }
}

// ============================================================================
// Tests
// ============================================================================
